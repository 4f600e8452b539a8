// File: plugbot-common/src/models/mod.rs
pub mod context;
pub mod reply;
pub mod plugin;

pub use context::{Context, ContextKind, MessageMeta};
pub use reply::{Reply, ReplyKind};
pub use plugin::{PluginMeta, PluginRecord, PluginStatesFile};
