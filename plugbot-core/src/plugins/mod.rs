//! Plugin host: the `Plugin` trait, the per-message `EventContext`
//! and the built-in plugins.

pub mod types;
pub mod manager;
pub mod godcmd;
pub mod nicesuno;
pub mod friendship;

use std::sync::Arc;

use async_trait::async_trait;
use plugbot_common::models::{Context, PluginMeta, Reply};
use plugbot_common::traits::ReplyChannel;

use crate::Error;
use crate::plugins::manager::PluginManager;

pub use godcmd::Godcmd;
pub use nicesuno::NiceSuno;
pub use friendship::Friendship;

/// What the chain should do after a plugin ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventAction {
    /// Hand the context to the next plugin.
    #[default]
    Continue,
    /// Skip the remaining plugins but let the default handler run.
    Break,
    /// Stop everything; `reply` (if any) is final.
    BreakPass,
}

/// Flags that shape a plugin's help output.
#[derive(Debug, Clone, Copy, Default)]
pub struct HelpRequest {
    pub verbose: bool,
    pub is_admin: bool,
    pub is_group: bool,
}

/// Everything a plugin sees while handling one inbound message.
pub struct EventContext {
    pub context: Context,
    pub reply: Option<Reply>,
    pub action: EventAction,
    pub channel: Arc<dyn ReplyChannel>,
    pub plugins: Arc<PluginManager>,
}

impl EventContext {
    pub fn new(context: Context, channel: Arc<dyn ReplyChannel>, plugins: Arc<PluginManager>) -> Self {
        Self {
            context,
            reply: None,
            action: EventAction::Continue,
            channel,
            plugins,
        }
    }

    /// Sets a final reply and stops the chain.
    pub fn finish(&mut self, reply: Reply) {
        self.reply = Some(reply);
        self.action = EventAction::BreakPass;
    }

    pub fn is_stopped(&self) -> bool {
        self.action != EventAction::Continue
    }
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn meta(&self) -> &PluginMeta;

    async fn on_handle_context(&self, ectx: &mut EventContext) -> Result<(), Error>;

    fn help_text(&self, req: HelpRequest) -> String;

    /// Re-reads the plugin's own config file.
    fn reload(&self) -> Result<(), Error> {
        Ok(())
    }
}
