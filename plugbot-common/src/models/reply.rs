use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    Text,
    Info,
    Error,
    /// `content` is a local file path.
    File,
    /// `content` is a remote image URL.
    ImageUrl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub kind: ReplyKind,
    pub content: String,
}

impl Reply {
    pub fn new(kind: ReplyKind, content: impl Into<String>) -> Self {
        Self { kind, content: content.into() }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::new(ReplyKind::Text, content)
    }

    pub fn info(content: impl Into<String>) -> Self {
        Self::new(ReplyKind::Info, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(ReplyKind::Error, content)
    }
}
