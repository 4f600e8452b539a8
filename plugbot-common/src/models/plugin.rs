use serde::{Deserialize, Serialize};

/// Static description of a plugin, as declared by the plugin itself
/// or by a `plugin.json` manifest in the plugin directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginMeta {
    pub name: String,
    /// Display name used in help output; defaults to `name`.
    #[serde(default)]
    pub namecn: Option<String>,
    #[serde(default)]
    pub desc: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub desire_priority: i32,
    #[serde(default)]
    pub hidden: bool,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl PluginMeta {
    pub fn display_name(&self) -> &str {
        self.namecn.as_deref().unwrap_or(&self.name)
    }
}

/// Record for a plugin in the saved plugin-state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRecord {
    pub name: String,
    pub enabled: bool,
    pub priority: i32,
}

/// A small JSON file that persists all the plugin records across restarts.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PluginStatesFile {
    pub plugins: Vec<PluginRecord>,
}
