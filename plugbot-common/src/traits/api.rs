use async_trait::async_trait;

use crate::error::Error;
use crate::models::{Context, Reply};

/// Outbound delivery of replies. Background jobs use this to push
/// results after the synchronous handler has already returned.
#[async_trait]
pub trait ReplyChannel: Send + Sync {
    async fn send(&self, reply: Reply, context: &Context) -> Result<(), Error>;

    /// Drops any in-flight work the channel queued for `session_id`.
    fn cancel_session(&self, session_id: &str);

    fn cancel_all_sessions(&self);
}

/// The conversational model sitting behind the plugin chain.
pub trait ChatBackend: Send + Sync {
    fn bot_type(&self) -> &str;

    /// Whether this backend keeps sessions that can be cleared.
    fn supports_session_reset(&self) -> bool;

    fn clear_session(&self, session_id: &str);

    fn clear_all_sessions(&self);

    /// Creates the session if missing. When `system_prompt` is given it
    /// replaces the session's current one.
    fn build_session(&self, session_id: &str, system_prompt: Option<&str>);

    fn system_prompt(&self, session_id: &str) -> Option<String>;

    /// Drops cached bot instances so a model change takes effect.
    fn reset_bot(&self);
}

/// Runtime switch between normal and verbose logging.
pub trait LogControl: Send + Sync {
    fn is_debug(&self) -> bool;

    fn set_debug(&self, enabled: bool) -> Result<(), Error>;
}
