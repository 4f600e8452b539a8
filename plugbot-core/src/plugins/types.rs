// src/plugins/types.rs
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use plugbot_common::models::PluginMeta;
use serde::{Deserialize, Serialize};

use crate::plugins::Plugin;

/// Where a registered plugin came from.
#[derive(Debug, Clone, PartialEq)]
pub enum PluginKind {
    /// Compiled into this binary.
    Builtin,
    /// Discovered through a `plugin.json` manifest under the plugin directory.
    External { dir: PathBuf },
}

/// One plugin known to the manager.
#[derive(Clone)]
pub struct PluginEntry {
    pub meta: PluginMeta,
    pub kind: PluginKind,
    pub enabled: bool,
    pub priority: i32,
    /// Only built-in plugins have an in-process instance.
    pub instance: Option<Arc<dyn Plugin>>,
}

/// Read-only view of a `PluginEntry` for listings.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginSummary {
    pub meta: PluginMeta,
    pub kind: PluginKind,
    pub enabled: bool,
    pub priority: i32,
}

impl From<&PluginEntry> for PluginSummary {
    fn from(e: &PluginEntry) -> Self {
        Self {
            meta: e.meta.clone(),
            kind: e.kind.clone(),
            enabled: e.enabled,
            priority: e.priority,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    pub url: String,
    #[serde(default)]
    pub desc: String,
}

/// `source.json`: installable plugins by name.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SourceIndex {
    #[serde(default)]
    pub repo: BTreeMap<String, SourceEntry>,
}

impl SourceIndex {
    pub fn find(&self, name: &str) -> Option<(&str, &SourceEntry)> {
        self.repo
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(k, v)| (k.as_str(), v))
    }
}
