//! Friendship: gives known sessions a fixed persona as system prompt.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use plugbot_common::models::PluginMeta;
use plugbot_common::traits::ChatBackend;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Error;
use crate::config::PluginConfigStore;
use crate::plugins::{EventAction, EventContext, HelpRequest, Plugin};

pub const PLUGIN_NAME: &str = "Friendship";

/// One persona and the sessions it applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendRecord {
    pub nick_name: String,
    /// May contain `{nick_name}`.
    pub character_desc: String,
    #[serde(default)]
    pub session_ids: Vec<String>,
}

impl FriendRecord {
    pub fn describe(&self) -> String {
        self.character_desc.replace("{nick_name}", &self.nick_name)
    }
}

pub struct Friendship {
    meta: PluginMeta,
    records: RwLock<Vec<FriendRecord>>,
    /// Resolved persona per session; `None` remembers a stranger.
    known: DashMap<String, Option<String>>,
    backend: Arc<dyn ChatBackend>,
    store: PluginConfigStore,
}

impl Friendship {
    /// Fails when the plugin has no config file.
    pub fn new(store: PluginConfigStore, backend: Arc<dyn ChatBackend>) -> Result<Self, Error> {
        let records = store
            .load::<Vec<FriendRecord>>(PLUGIN_NAME)?
            .ok_or_else(|| Error::Config("[Friendship] config.json not found".to_string()))?;
        info!("[Friendship] inited with {} records", records.len());
        Ok(Self::with_records(records, store, backend))
    }

    pub fn with_records(records: Vec<FriendRecord>, store: PluginConfigStore, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            meta: PluginMeta {
                name: PLUGIN_NAME.to_string(),
                namecn: Some("友好关系".to_string()),
                desc: "我们的友谊天长地久。".to_string(),
                version: "1.1".to_string(),
                author: "空心菜".to_string(),
                desire_priority: -10,
                hidden: false,
            },
            records: RwLock::new(records),
            known: DashMap::new(),
            backend,
            store,
        }
    }

    fn character_for(&self, session_id: &str) -> Option<(String, String)> {
        self.records
            .read()
            .iter()
            .find(|r| r.session_ids.iter().any(|s| s == session_id))
            .map(|r| (r.nick_name.clone(), r.describe()))
    }

    fn resolve(&self, session_id: &str) -> Option<String> {
        if let Some(known) = self.known.get(session_id) {
            return known.clone();
        }
        let resolved = match self.character_for(session_id) {
            Some((nick, desc)) => {
                debug!("[Friendship] Welcome {}, I love you!", nick);
                self.backend.build_session(session_id, Some(&desc));
                Some(desc)
            }
            None => {
                debug!("[Friendship] Welcome stranger, you are ignored!");
                None
            }
        };
        self.known.insert(session_id.to_string(), resolved.clone());
        resolved
    }
}

#[async_trait]
impl Plugin for Friendship {
    fn meta(&self) -> &PluginMeta {
        &self.meta
    }

    async fn on_handle_context(&self, ectx: &mut EventContext) -> Result<(), Error> {
        if !ectx.context.is_text() {
            return Ok(());
        }
        debug!("[Friendship] on_handle_context.");
        let session_id = ectx.context.session_id.clone();
        let Some(desc) = self.resolve(&session_id) else {
            return Ok(());
        };
        self.backend.build_session(&session_id, None);
        if self.backend.system_prompt(&session_id).as_deref() != Some(desc.as_str()) {
            debug!("[Friendship] restoring persona of session {}", session_id);
            self.backend.build_session(&session_id, Some(&desc));
        }
        ectx.action = EventAction::Break;
        Ok(())
    }

    fn help_text(&self, _req: HelpRequest) -> String {
        "我们的友谊天长地久。\n".to_string()
    }

    fn reload(&self) -> Result<(), Error> {
        if let Some(records) = self.store.load::<Vec<FriendRecord>>(PLUGIN_NAME)? {
            *self.records.write() = records;
            self.known.clear();
            info!("[Friendship] config reloaded");
        }
        Ok(())
    }
}
