use std::collections::HashSet;

use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Map, Value};

use super::base::{GenerateConfig, Generation, Grounding, PromptFeedback, Usage};
use crate::models::message::{Message, MessageContent};
use crate::models::tool::{Tool, ToolCall};

lazy_static! {
    static ref INVALID_NAME_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_-]").expect("valid regex");
}

/// Convert internal Message format to Gemini's `contents` specification
pub fn messages_to_gemini_spec(messages: &[Message]) -> Vec<Value> {
    let mut contents = Vec::new();

    for message in messages {
        let mut parts = Vec::new();

        for content in &message.content {
            match content {
                MessageContent::Text(text) => {
                    if !text.text.is_empty() {
                        parts.push(json!({ "text": text.text }));
                    }
                }
                MessageContent::Image(image) => {
                    parts.push(json!({
                        "inlineData": {
                            "mimeType": image.mime_type,
                            "data": image.data,
                        }
                    }));
                }
                MessageContent::ToolRequest(call) => {
                    parts.push(json!({
                        "functionCall": {
                            "name": sanitize_function_name(&call.name),
                            "args": call.arguments,
                        }
                    }));
                }
                MessageContent::ToolResponse(response) => {
                    parts.push(json!({
                        "functionResponse": {
                            "name": sanitize_function_name(&response.name),
                            "response": { "content": response.output },
                        }
                    }));
                }
            }
        }

        if !parts.is_empty() {
            contents.push(json!({
                "role": message.role,
                "parts": parts,
            }));
        }
    }

    contents
}

/// Convert the tool settings of a request into Gemini's `tools` specification
pub fn tools_to_gemini_spec(config: &GenerateConfig) -> Result<Vec<Value>> {
    let mut result = Vec::new();

    if config.web_search {
        result.push(json!({ "googleSearch": {} }));
    }

    if !config.tools.is_empty() {
        let mut tool_names = HashSet::new();
        let mut declarations = Vec::new();
        for tool in &config.tools {
            if !tool_names.insert(&tool.name) {
                return Err(anyhow!("Duplicate tool name: {}", tool.name));
            }
            declarations.push(function_declaration(tool));
        }
        result.push(json!({ "functionDeclarations": declarations }));
    }

    Ok(result)
}

fn function_declaration(tool: &Tool) -> Value {
    let mut declaration = json!({
        "name": sanitize_function_name(&tool.name),
        "description": tool.description,
    });

    // Gemini rejects object schemas without properties, parameterless functions omit the schema
    let has_properties = tool
        .parameters
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|props| !props.is_empty());
    if has_properties {
        declaration["parameters"] = tool.parameters.clone();
    }

    declaration
}

/// Build the `generationConfig` object for a request
pub fn generation_config_spec(config: &GenerateConfig) -> Value {
    let mut spec = json!({ "responseModalities": ["TEXT"] });
    if let Some(temperature) = config.temperature {
        spec["temperature"] = json!(temperature);
    }
    spec
}

/// Convert Gemini's generateContent response to the internal Generation format
pub fn gemini_response_to_generation(response: &Value) -> Result<Generation> {
    if !response.is_object() {
        return Err(anyhow!("Unexpected response shape: {}", response));
    }

    let candidate = response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first());

    let message = candidate
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| parts_to_message(parts))
        .filter(|message| !message.content.is_empty());

    let grounding = candidate
        .and_then(|c| c.get("groundingMetadata"))
        .map(grounding_from_metadata);

    let mut feedback = response.get("promptFeedback").map(|feedback| PromptFeedback {
        block_reason: string_field(feedback, "blockReason"),
        block_reason_message: string_field(feedback, "blockReasonMessage"),
    });

    // A candidate stopped for safety reasons has no parts and no prompt feedback
    if message.is_none() && feedback.is_none() {
        if let Some(reason) = candidate.and_then(|c| string_field(c, "finishReason")) {
            feedback = Some(PromptFeedback {
                block_reason: Some(reason),
                block_reason_message: None,
            });
        }
    }

    Ok(Generation {
        message,
        grounding,
        feedback,
        usage: usage_from_metadata(response.get("usageMetadata")),
    })
}

fn parts_to_message(parts: &[Value]) -> Message {
    let mut message = Message::model();

    for part in parts {
        if part.get("thought").and_then(Value::as_bool) == Some(true) {
            continue;
        }
        if let Some(call) = part.get("functionCall") {
            let name = call
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let arguments = call
                .get("args")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()));
            message = message.with_tool_request(ToolCall::new(name, arguments));
        } else if let Some(text) = part.get("text").and_then(Value::as_str) {
            message = message.with_text(text);
        } else if let Some(data) = part.get("inlineData") {
            let mime_type = string_field(data, "mimeType").unwrap_or_default();
            let payload = string_field(data, "data").unwrap_or_default();
            message = message.with_content(MessageContent::image(payload, mime_type));
        }
    }

    message
}

fn grounding_from_metadata(metadata: &Value) -> Grounding {
    let source_uri = metadata
        .get("groundingChunks")
        .and_then(Value::as_array)
        .and_then(|chunks| {
            chunks
                .iter()
                .find_map(|chunk| chunk.get("web").and_then(|web| string_field(web, "uri")))
        });

    let rendered_content = metadata
        .get("searchEntryPoint")
        .and_then(|entry| string_field(entry, "renderedContent"));

    let search_queries = metadata
        .get("webSearchQueries")
        .and_then(Value::as_array)
        .map(|queries| {
            queries
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    Grounding {
        source_uri,
        rendered_content,
        search_queries,
    }
}

fn usage_from_metadata(metadata: Option<&Value>) -> Usage {
    let Some(metadata) = metadata else {
        return Usage::default();
    };
    let count = |key: &str| {
        metadata
            .get(key)
            .and_then(Value::as_i64)
            .and_then(|v| i32::try_from(v).ok())
    };
    Usage::new(
        count("promptTokenCount"),
        count("candidatesTokenCount"),
        count("totalTokenCount"),
    )
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}

pub fn sanitize_function_name(name: &str) -> String {
    INVALID_NAME_CHARS.replace_all(name, "_").to_string()
}
