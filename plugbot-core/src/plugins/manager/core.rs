//! plugins/manager/core.rs
//!
//! Contains the `PluginManager` struct: registration, the persisted
//! enable/priority state, event dispatch and plugin maintenance.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use plugbot_common::models::{Context, PluginMeta, PluginRecord, PluginStatesFile};
use plugbot_common::traits::ReplyChannel;
use tracing::{debug, error, info, warn};

use crate::Error;
use crate::plugins::manager::installer::PluginInstaller;
use crate::plugins::types::{PluginEntry, PluginKind, PluginSummary, SourceIndex};
use crate::plugins::{EventAction, EventContext, Plugin};

const MANIFEST_FILE: &str = "plugin.json";
const SOURCE_FILE: &str = "source.json";

/// Loads, stores and dispatches to plugins.
pub struct PluginManager {
    entries: RwLock<Vec<PluginEntry>>,

    /// Saved enable/priority state, including plugins not registered this run.
    plugin_records: Mutex<Vec<PluginRecord>>,

    /// Where we store plugin_records JSON.
    persist_path: PathBuf,

    /// Directory holding installed plugins and `source.json`.
    plugin_dir: PathBuf,

    installer: Box<dyn PluginInstaller>,
}

impl PluginManager {
    pub fn new(plugin_dir: impl Into<PathBuf>, installer: Box<dyn PluginInstaller>) -> Self {
        let plugin_dir = plugin_dir.into();
        let manager = Self {
            entries: RwLock::new(Vec::new()),
            plugin_records: Mutex::new(Vec::new()),
            persist_path: plugin_dir.join("plugins.json"),
            plugin_dir,
            installer,
        };
        manager.load_plugin_states();
        manager
    }

    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    /// Loads the plugin states from disk. Called in `new()`.
    fn load_plugin_states(&self) {
        if !self.persist_path.exists() {
            info!("No plugin-states file at {:?}; using empty defaults.", self.persist_path);
            return;
        }
        match fs::read_to_string(&self.persist_path) {
            Ok(contents) => match serde_json::from_str::<PluginStatesFile>(&contents) {
                Ok(parsed) => {
                    let mut lock = self.plugin_records.lock();
                    *lock = parsed.plugins;
                    info!("Loaded {} plugin records from {:?}", lock.len(), self.persist_path);
                }
                Err(e) => {
                    error!("Could not parse plugin-states JSON at {:?}: {:?}", self.persist_path, e);
                }
            },
            Err(e) => {
                error!("Could not read plugin-states file at {:?}: {:?}", self.persist_path, e);
            }
        }
    }

    /// Saves the current plugin records to disk (JSON).
    fn save_plugin_states(&self) {
        let data = PluginStatesFile { plugins: self.plugin_records.lock().clone() };
        let contents = match serde_json::to_string_pretty(&data) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to serialize plugin states: {:?}", e);
                return;
            }
        };
        if let Err(e) = fs::create_dir_all(&self.plugin_dir) {
            error!("Failed to create plugin dir {:?}: {:?}", self.plugin_dir, e);
            return;
        }
        if let Err(e) = fs::write(&self.persist_path, contents) {
            error!("Failed to write plugin-states file: {:?}", e);
        }
    }

    fn saved_record(&self, name: &str) -> Option<PluginRecord> {
        self.plugin_records
            .lock()
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    fn upsert_plugin_record(&self, record: PluginRecord) {
        let mut lock = self.plugin_records.lock();
        if let Some(existing) = lock.iter_mut().find(|r| r.name.eq_ignore_ascii_case(&record.name)) {
            *existing = record;
        } else {
            lock.push(record);
        }
        drop(lock);
        self.save_plugin_states();
    }

    fn insert_entry(&self, meta: PluginMeta, kind: PluginKind, instance: Option<Arc<dyn Plugin>>) -> Result<(), Error> {
        if self.find(&meta.name).is_some() {
            return Err(Error::Plugin(format!("Plugin '{}' already registered", meta.name)));
        }
        let (enabled, priority) = match self.saved_record(&meta.name) {
            Some(rec) => (rec.enabled, rec.priority),
            None => (true, meta.desire_priority),
        };
        info!("Registering plugin '{}' v{} (priority {}, enabled {})", meta.name, meta.version, priority, enabled);
        self.upsert_plugin_record(PluginRecord { name: meta.name.clone(), enabled, priority });
        self.entries.write().push(PluginEntry { meta, kind, enabled, priority, instance });
        Ok(())
    }

    /// Registers a compiled-in plugin. Names are unique, case-insensitively.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> Result<(), Error> {
        let meta = plugin.meta().clone();
        self.insert_entry(meta, PluginKind::Builtin, Some(plugin))
    }

    pub fn find(&self, name: &str) -> Option<PluginSummary> {
        self.entries
            .read()
            .iter()
            .find(|e| e.meta.name.eq_ignore_ascii_case(name))
            .map(PluginSummary::from)
    }

    pub fn instance(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.entries
            .read()
            .iter()
            .find(|e| e.meta.name.eq_ignore_ascii_case(name))
            .and_then(|e| e.instance.clone())
    }

    /// All plugins, highest priority first.
    pub fn list_plugins(&self) -> Vec<PluginSummary> {
        let mut out: Vec<PluginSummary> = self.entries.read().iter().map(PluginSummary::from).collect();
        out.sort_by(|a, b| b.priority.cmp(&a.priority));
        out
    }

    /// Runs `context` through the enabled in-process plugins, highest
    /// priority first, until one of them breaks the chain.
    pub async fn emit(self: &Arc<Self>, context: Context, channel: Arc<dyn ReplyChannel>) -> EventContext {
        let mut chain: Vec<(i32, String, Arc<dyn Plugin>)> = self
            .entries
            .read()
            .iter()
            .filter(|e| e.enabled)
            .filter_map(|e| e.instance.clone().map(|p| (e.priority, e.meta.name.clone(), p)))
            .collect();
        chain.sort_by(|a, b| b.0.cmp(&a.0));

        let mut ectx = EventContext::new(context, channel, self.clone());
        for (_, name, plugin) in chain {
            if let Err(e) = plugin.on_handle_context(&mut ectx).await {
                warn!("Plugin '{}' failed to handle context: {}", name, e);
            }
            if ectx.action != EventAction::Continue {
                debug!("Plugin '{}' stopped the chain with {:?}", name, ectx.action);
                break;
            }
        }
        ectx
    }

    fn with_entry<R>(&self, name: &str, f: impl FnOnce(&mut PluginEntry) -> R) -> Option<R> {
        let mut guard = self.entries.write();
        let entry = guard.iter_mut().find(|e| e.meta.name.eq_ignore_ascii_case(name))?;
        let out = f(entry);
        let record = PluginRecord { name: entry.meta.name.clone(), enabled: entry.enabled, priority: entry.priority };
        drop(guard);
        self.upsert_plugin_record(record);
        Some(out)
    }

    pub fn set_plugin_priority(&self, name: &str, priority: i32) -> bool {
        self.with_entry(name, |e| e.priority = priority).is_some()
    }

    pub fn enable_plugin(&self, name: &str) -> (bool, String) {
        match self.with_entry(name, |e| std::mem::replace(&mut e.enabled, true)) {
            None => (false, "插件不存在".to_string()),
            Some(true) => (true, "插件已启用".to_string()),
            Some(false) => {
                info!("Plugin '{}' enabled", name);
                (true, "插件已启用".to_string())
            }
        }
    }

    pub fn disable_plugin(&self, name: &str) -> bool {
        self.with_entry(name, |e| e.enabled = false).is_some()
    }

    /// Re-reads the plugin's config. External plugins have nothing to reload.
    pub fn reload_plugin(&self, name: &str) -> bool {
        let Some(summary) = self.find(name) else {
            return false;
        };
        if let Some(plugin) = self.instance(name) {
            if let Err(e) = plugin.reload() {
                error!("Failed to reload plugin '{}': {}", summary.meta.name, e);
            }
        }
        true
    }

    /// Looks for `plugin.json` manifests under the plugin directory and
    /// registers the ones not known yet. Returns the newly found plugins.
    pub fn scan_plugins(&self) -> Result<Vec<PluginMeta>, Error> {
        if !self.plugin_dir.exists() {
            info!("Plugin folder {:?} does not exist; skipping.", self.plugin_dir);
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.plugin_dir)? {
            let path = entry?.path();
            let manifest = path.join(MANIFEST_FILE);
            if !path.is_dir() || !manifest.exists() {
                continue;
            }
            let meta: PluginMeta = match fs::read_to_string(&manifest)
                .map_err(Error::from)
                .and_then(|s| serde_json::from_str(&s).map_err(Error::from))
            {
                Ok(m) => m,
                Err(e) => {
                    warn!("Skipping plugin at {:?}: bad manifest: {}", path, e);
                    continue;
                }
            };
            if self.find(&meta.name).is_some() {
                continue;
            }
            self.insert_entry(meta.clone(), PluginKind::External { dir: path }, None)?;
            found.push(meta);
        }
        Ok(found)
    }

    fn load_source_index(&self) -> SourceIndex {
        let path = self.plugin_dir.join(SOURCE_FILE);
        match fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                warn!("Could not parse {:?}: {}", path, e);
                SourceIndex::default()
            }),
            Err(_) => SourceIndex::default(),
        }
    }

    /// Installs from a `.git` URL, or by name through `source.json`.
    pub async fn install_plugin(&self, name_or_url: &str) -> (bool, String) {
        let (dir_name, url) = if name_or_url.ends_with(".git") {
            let repo = name_or_url
                .trim_end_matches(".git")
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string();
            (repo, name_or_url.to_string())
        } else {
            let index = self.load_source_index();
            match index.find(name_or_url) {
                Some((name, entry)) => (name.to_string(), entry.url.clone()),
                None => return (false, "插件源中不存在该插件，请提供.git结尾的仓库地址".to_string()),
            }
        };
        if dir_name.is_empty() {
            return (false, "仓库地址有误".to_string());
        }

        let dest = self.plugin_dir.join(&dir_name);
        if dest.exists() || self.find(&dir_name).is_some() {
            return (false, "插件已存在".to_string());
        }
        if let Err(e) = fs::create_dir_all(&self.plugin_dir) {
            return (false, format!("安装插件失败，{}", e));
        }
        match self.installer.clone_repo(&url, &dest).await {
            Ok(()) => {
                info!("Installed plugin '{}' from {}", dir_name, url);
                (true, "安装插件成功，请使用 #scanp 命令扫描插件或重启程序，开启前请检查插件是否需要配置".to_string())
            }
            Err(e) => {
                error!("Failed to install plugin from {}: {}", url, e);
                (false, format!("安装插件失败，{}", e))
            }
        }
    }

    pub async fn uninstall_plugin(&self, name: &str) -> (bool, String) {
        let Some(summary) = self.find(name) else {
            return (false, "插件不存在".to_string());
        };
        let PluginKind::External { dir } = summary.kind else {
            return (false, "内置插件不可卸载".to_string());
        };
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            error!("Failed to remove plugin dir {:?}: {}", dir, e);
            return (false, format!("卸载插件失败，{}", e));
        }
        self.entries.write().retain(|e| !e.meta.name.eq_ignore_ascii_case(name));
        self.plugin_records.lock().retain(|r| !r.name.eq_ignore_ascii_case(name));
        self.save_plugin_states();
        info!("Uninstalled plugin '{}'", summary.meta.name);
        (true, "卸载插件成功".to_string())
    }

    pub async fn update_plugin(&self, name: &str) -> (bool, String) {
        let Some(summary) = self.find(name) else {
            return (false, "插件不存在".to_string());
        };
        let PluginKind::External { dir } = summary.kind else {
            return (false, "内置插件不可更新".to_string());
        };
        match self.installer.pull(&dir).await {
            Ok(()) => (true, "更新插件成功，请重新运行程序".to_string()),
            Err(e) => {
                error!("Failed to update plugin '{}': {}", summary.meta.name, e);
                (false, format!("更新插件失败，{}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::manager::installer::MockPluginInstaller;

    fn write_manifest(dir: &Path, name: &str, priority: i32) {
        let plugin = dir.join(name.to_lowercase());
        fs::create_dir_all(&plugin).unwrap();
        let manifest = serde_json::json!({
            "name": name,
            "version": "0.2",
            "desc": "test plugin",
            "desire_priority": priority,
        });
        fs::write(plugin.join(MANIFEST_FILE), manifest.to_string()).unwrap();
    }

    #[test]
    fn scan_registers_new_manifests_once() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "Echo", 5);
        let pm = PluginManager::new(dir.path(), Box::new(MockPluginInstaller::new()));

        let found = pm.scan_plugins().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Echo");
        assert!(pm.scan_plugins().unwrap().is_empty());

        let listed = pm.find("echo").unwrap();
        assert_eq!(listed.priority, 5);
        assert!(listed.enabled);
    }

    #[test]
    fn state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "Echo", 5);
        {
            let pm = PluginManager::new(dir.path(), Box::new(MockPluginInstaller::new()));
            pm.scan_plugins().unwrap();
            assert!(pm.set_plugin_priority("ECHO", 42));
            assert!(pm.disable_plugin("echo"));
        }
        let pm = PluginManager::new(dir.path(), Box::new(MockPluginInstaller::new()));
        pm.scan_plugins().unwrap();
        let echo = pm.find("Echo").unwrap();
        assert_eq!(echo.priority, 42);
        assert!(!echo.enabled);
    }

    #[tokio::test]
    async fn install_by_git_url_clones_into_plugin_dir() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("hello-plugin");
        let mut installer = MockPluginInstaller::new();
        installer
            .expect_clone_repo()
            .withf(move |url, dest| url == "https://example.com/me/hello-plugin.git" && dest == expected.as_path())
            .times(1)
            .returning(|_, _| Ok(()));
        let pm = PluginManager::new(dir.path(), Box::new(installer));

        let (ok, msg) = pm.install_plugin("https://example.com/me/hello-plugin.git").await;
        assert!(ok, "{}", msg);
    }

    #[tokio::test]
    async fn install_unknown_name_is_rejected_without_cloning() {
        let dir = tempfile::tempdir().unwrap();
        let mut installer = MockPluginInstaller::new();
        installer.expect_clone_repo().never();
        let pm = PluginManager::new(dir.path(), Box::new(installer));

        let (ok, _) = pm.install_plugin("nope").await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn uninstall_removes_external_plugin() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "Echo", 0);
        let pm = PluginManager::new(dir.path(), Box::new(MockPluginInstaller::new()));
        pm.scan_plugins().unwrap();

        let (ok, msg) = pm.uninstall_plugin("echo").await;
        assert!(ok);
        assert_eq!(msg, "卸载插件成功");
        assert!(pm.find("echo").is_none());
        assert!(!dir.path().join("echo").exists());
    }
}
