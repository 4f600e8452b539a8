use async_trait::async_trait;
use plugbot_common::Error;
use plugbot_common::models::{Context, Reply, ReplyKind};
use plugbot_common::traits::ReplyChannel;
use tracing::debug;

/// Prints replies to stdout. Used as the channel for the interactive console.
pub struct ConsoleChannel;

pub fn render(reply: &Reply) -> String {
    match reply.kind {
        ReplyKind::Text | ReplyKind::Info => reply.content.clone(),
        ReplyKind::Error => format!("[ERROR] {}", reply.content),
        ReplyKind::File => format!("[FILE] {}", reply.content),
        ReplyKind::ImageUrl => format!("[IMAGE] {}", reply.content),
    }
}

#[async_trait]
impl ReplyChannel for ConsoleChannel {
    async fn send(&self, reply: Reply, context: &Context) -> Result<(), Error> {
        println!("{}", render(&reply));
        debug!("Reply delivered to {}", context.receiver);
        Ok(())
    }

    fn cancel_session(&self, session_id: &str) {
        debug!("Nothing queued for session {}", session_id);
    }

    fn cancel_all_sessions(&self) {
        debug!("Nothing queued on the console");
    }
}
