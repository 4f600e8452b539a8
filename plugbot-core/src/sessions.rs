//! In-process `ChatBackend` that only tracks session state.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use plugbot_common::traits::ChatBackend;
use tracing::debug;

/// Backend types that keep conversation sessions.
pub const SESSION_BOT_TYPES: &[&str] = &[
    "openAI", "chatGPT", "chatGPTOnAzure", "linkai", "baidu", "xunfei", "qwen", "gemini",
    "glm-4", "moonshot",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub system_prompt: Option<String>,
}

pub struct InMemorySessions {
    bot_type: String,
    sessions: DashMap<String, Session>,
    /// Bumped on every `reset_bot`, so callers can observe a reset.
    generation: AtomicU64,
}

impl InMemorySessions {
    pub fn new(bot_type: impl Into<String>) -> Self {
        Self {
            bot_type: bot_type.into(),
            sessions: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn has_session(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl ChatBackend for InMemorySessions {
    fn bot_type(&self) -> &str {
        &self.bot_type
    }

    fn supports_session_reset(&self) -> bool {
        SESSION_BOT_TYPES.contains(&self.bot_type.as_str())
    }

    fn clear_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    fn clear_all_sessions(&self) {
        self.sessions.clear();
    }

    fn build_session(&self, session_id: &str, system_prompt: Option<&str>) {
        let mut entry = self.sessions.entry(session_id.to_string()).or_default();
        if let Some(prompt) = system_prompt {
            entry.system_prompt = Some(prompt.to_string());
        }
    }

    fn system_prompt(&self, session_id: &str) -> Option<String> {
        self.sessions.get(session_id).and_then(|s| s.system_prompt.clone())
    }

    fn reset_bot(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Chat backend reset (generation {})", generation);
    }
}
