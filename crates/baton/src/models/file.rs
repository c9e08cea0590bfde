use serde::{Deserialize, Serialize};

/// A file supplied alongside the task, shared read-only by every agent in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    pub mime_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new<N: Into<String>, M: Into<String>>(name: N, mime_type: M, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}
