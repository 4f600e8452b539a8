use serde::{Deserialize, Serialize};

/// What kind of inbound message a `Context` wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    Text,
    Voice,
    Image,
    ImageCreate,
    File,
    Sharing,
}

/// Sender/recipient details of the raw message behind a context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMeta {
    /// In groups, the member who actually sent the message.
    pub actual_user_id: String,
    pub actual_user_nickname: Option<String>,
    pub other_user_nickname: Option<String>,
    /// The bot's own display name in this conversation.
    pub to_user_nickname: String,
}

impl MessageMeta {
    /// Nickname used when addressing the requester ("发起人").
    pub fn requester_nickname(&self) -> String {
        self.actual_user_nickname
            .clone()
            .or_else(|| self.other_user_nickname.clone())
            .unwrap_or_default()
    }
}

/// One inbound message as seen by the plugin chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub kind: ContextKind,
    pub content: String,
    pub session_id: String,
    /// Identity the reply goes to; for private chats this is the caller.
    pub receiver: String,
    pub is_group: bool,
    pub msg: MessageMeta,
}

impl Context {
    pub fn text(content: impl Into<String>, receiver: impl Into<String>) -> Self {
        let receiver = receiver.into();
        Self {
            kind: ContextKind::Text,
            content: content.into(),
            session_id: receiver.clone(),
            receiver: receiver.clone(),
            is_group: false,
            msg: MessageMeta {
                actual_user_id: receiver,
                ..MessageMeta::default()
            },
        }
    }

    /// Marks the context as a group message sent by `actual_user_id`.
    pub fn in_group(mut self, actual_user_id: impl Into<String>) -> Self {
        self.is_group = true;
        self.msg.actual_user_id = actual_user_id.into();
        self
    }

    pub fn is_text(&self) -> bool {
        self.kind == ContextKind::Text
    }
}
