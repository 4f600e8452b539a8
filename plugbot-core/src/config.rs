//! Global bot configuration, per-plugin config files and per-user overrides.

use std::fs;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::Error;

pub const GPT35: &str = "gpt-3.5-turbo";
pub const GPT4_TURBO_PREVIEW: &str = "gpt-4-turbo-preview";

/// Model names accepted by the `model` command.
pub const MODEL_LIST: &[&str] = &[
    "gpt-3.5-turbo",
    "gpt-3.5-turbo-16k",
    "gpt-4",
    "gpt-4-turbo",
    "gpt-4-turbo-preview",
    "gpt-4o",
    "gpt-4o-mini",
    "wenxin",
    "wenxin-4",
    "xunfei",
    "qwen",
    "gemini",
    "glm-4",
    "moonshot-v1-8k",
    "claude-3-opus-20240229",
];

/// Aliases that the chat backends know under another name.
pub fn model_mapping(model: &str) -> String {
    match model {
        "gpt-4-turbo" => GPT4_TURBO_PREVIEW.to_string(),
        other => other.to_string(),
    }
}

fn default_model() -> String {
    GPT35.to_string()
}
fn default_text_to_image() -> String {
    "dall-e-2".to_string()
}
fn default_channel_type() -> String {
    "wx".to_string()
}
fn default_command_trigger() -> char {
    '#'
}
fn default_plugin_trigger_prefix() -> String {
    "$".to_string()
}
fn default_clear_memory_commands() -> Vec<String> {
    vec!["#清除记忆".to_string()]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_text_to_image")]
    pub text_to_image: String,
    #[serde(default = "default_channel_type")]
    pub channel_type: String,
    /// Leading character that marks a line as a command.
    #[serde(default = "default_command_trigger")]
    pub command_trigger: char,
    #[serde(default = "default_plugin_trigger_prefix")]
    pub plugin_trigger_prefix: String,
    #[serde(default)]
    pub group_chat_admin_commands: bool,
    /// Extra aliases for the `reset` command, written with the trigger (`#清除记忆`).
    #[serde(default = "default_clear_memory_commands")]
    pub clear_memory_commands: Vec<String>,
    #[serde(default)]
    pub debug: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            text_to_image: default_text_to_image(),
            channel_type: default_channel_type(),
            command_trigger: default_command_trigger(),
            plugin_trigger_prefix: default_plugin_trigger_prefix(),
            group_chat_admin_commands: false,
            clear_memory_commands: default_clear_memory_commands(),
            debug: false,
        }
    }
}

/// Shared, reloadable handle on the global `BotConfig`.
pub struct ConfigHandle {
    path: Option<PathBuf>,
    inner: RwLock<BotConfig>,
}

impl ConfigHandle {
    /// Keeps `config` in memory only; `reload` becomes a no-op.
    pub fn in_memory(config: BotConfig) -> Self {
        Self { path: None, inner: RwLock::new(config) }
    }

    /// Loads from `path`, falling back to defaults when the file does not exist yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let config = read_bot_config(&path)?;
        Ok(Self { path: Some(path), inner: RwLock::new(config) })
    }

    pub fn get(&self) -> BotConfig {
        self.inner.read().clone()
    }

    pub fn update<F: FnOnce(&mut BotConfig)>(&self, f: F) {
        let mut guard = self.inner.write();
        f(&mut guard);
    }

    /// Re-reads the config file. In-memory edits (e.g. a model switch) are discarded.
    pub fn reload(&self) -> Result<(), Error> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let fresh = read_bot_config(path)?;
        *self.inner.write() = fresh;
        info!("Reloaded config from {:?}", path);
        Ok(())
    }
}

fn read_bot_config(path: &Path) -> Result<BotConfig, Error> {
    if !path.exists() {
        warn!("No config file at {:?}; using defaults.", path);
        return Ok(BotConfig::default());
    }
    let contents = fs::read_to_string(path)?;
    let config = serde_json::from_str(&contents)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    Ok(config)
}

/// Per-plugin JSON files, stored as `<dir>/<plugin>/config.json`.
#[derive(Debug, Clone)]
pub struct PluginConfigStore {
    dir: PathBuf,
}

impl PluginConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self, plugin: &str) -> PathBuf {
        self.dir.join(plugin.to_lowercase()).join("config.json")
    }

    /// Returns `Ok(None)` when the plugin has no config file.
    pub fn load<T: DeserializeOwned>(&self, plugin: &str) -> Result<Option<T>, Error> {
        let path = self.config_path(plugin);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        let parsed = serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(Some(parsed))
    }

    pub fn save<T: Serialize>(&self, plugin: &str, value: &T) -> Result<(), Error> {
        let path = self.config_path(plugin);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(value)?)?;
        Ok(())
    }
}

/// Private overrides a user set for themselves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserData {
    pub openai_api_key: Option<String>,
    pub gpt_model: Option<String>,
}

#[derive(Debug, Default)]
pub struct UserDataStore {
    users: DashMap<String, UserData>,
}

impl UserDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &str) -> UserData {
        self.users.get(user_id).map(|d| d.clone()).unwrap_or_default()
    }

    pub fn update<R>(&self, user_id: &str, f: impl FnOnce(&mut UserData) -> R) -> R {
        let mut entry = self.users.entry(user_id.to_string()).or_default();
        f(entry.value_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: BotConfig = serde_json::from_str(r#"{"model": "gpt-4"}"#).unwrap();
        assert_eq!(cfg.model, "gpt-4");
        assert_eq!(cfg.command_trigger, '#');
        assert_eq!(cfg.plugin_trigger_prefix, "$");
        assert!(!cfg.group_chat_admin_commands);
    }

    #[test]
    fn reload_picks_up_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"model": "gpt-4"}"#).unwrap();

        let handle = ConfigHandle::load(&path).unwrap();
        handle.update(|c| c.model = "qwen".into());
        assert_eq!(handle.get().model, "qwen");

        handle.reload().unwrap();
        assert_eq!(handle.get().model, "gpt-4");
    }

    #[test]
    fn turbo_alias_is_mapped() {
        assert_eq!(model_mapping("gpt-4-turbo"), GPT4_TURBO_PREVIEW);
        assert_eq!(model_mapping("gpt-4"), "gpt-4");
    }
}
