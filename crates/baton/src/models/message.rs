use super::content::{ImageContent, TextContent};
use super::role::Role;
use super::tool::ToolCall;

/// The result of running a tool, echoed back to the model as a function response
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolResponse {
    pub name: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
/// Content passed inside a message, which can be both simple content and tool content
pub enum MessageContent {
    Text(TextContent),
    Image(ImageContent),
    ToolRequest(ToolCall),
    ToolResponse(ToolResponse),
}

impl MessageContent {
    pub fn text<S: Into<String>>(text: S) -> Self {
        MessageContent::Text(TextContent { text: text.into() })
    }

    pub fn image<S: Into<String>, T: Into<String>>(data: S, mime_type: T) -> Self {
        MessageContent::Image(ImageContent {
            data: data.into(),
            mime_type: mime_type.into(),
        })
    }

    pub fn tool_request(tool_call: ToolCall) -> Self {
        MessageContent::ToolRequest(tool_call)
    }

    pub fn tool_response<S: Into<String>, O: Into<String>>(name: S, output: O) -> Self {
        MessageContent::ToolResponse(ToolResponse {
            name: name.into(),
            output: output.into(),
        })
    }

    pub fn as_tool_request(&self) -> Option<&ToolCall> {
        if let MessageContent::ToolRequest(ref tool_call) = self {
            Some(tool_call)
        } else {
            None
        }
    }

    pub fn as_tool_response(&self) -> Option<&ToolResponse> {
        if let MessageContent::ToolResponse(ref tool_response) = self {
            Some(tool_response)
        } else {
            None
        }
    }

    /// Get the text content if this is a TextContent variant
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(&text.text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
/// A message to or from an LLM
pub struct Message {
    pub role: Role,
    pub content: Vec<MessageContent>,
}

impl Message {
    pub fn user() -> Self {
        Message {
            role: Role::User,
            content: Vec::new(),
        }
    }

    pub fn model() -> Self {
        Message {
            role: Role::Model,
            content: Vec::new(),
        }
    }

    /// Add any MessageContent to the message
    pub fn with_content(mut self, content: MessageContent) -> Self {
        self.content.push(content);
        self
    }

    /// Add text content to the message
    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_content(MessageContent::text(text))
    }

    /// Add image content to the message
    pub fn with_image(self, image: ImageContent) -> Self {
        self.with_content(MessageContent::Image(image))
    }

    /// Add a tool request to the message
    pub fn with_tool_request(self, tool_call: ToolCall) -> Self {
        self.with_content(MessageContent::tool_request(tool_call))
    }

    /// Add a tool response to the message
    pub fn with_tool_response<S: Into<String>, O: Into<String>>(self, name: S, output: O) -> Self {
        self.with_content(MessageContent::tool_response(name, output))
    }

    /// The function call if it is the first piece of content, which is what drives the tool cycle
    pub fn leading_tool_request(&self) -> Option<&ToolCall> {
        self.content.first().and_then(MessageContent::as_tool_request)
    }

    /// All text segments of the message, in order
    pub fn texts(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(MessageContent::as_text)
            .collect()
    }
}
