// File: plugbot-core/tests/test_utils/helpers.rs

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use plugbot_common::models::{Context, Reply};
use plugbot_common::traits::{LogControl, ReplyChannel};
use plugbot_core::Error;
use plugbot_core::config::{BotConfig, ConfigHandle, PluginConfigStore, UserDataStore};
use plugbot_core::plugins::godcmd::{Godcmd, GodcmdConfig};
use plugbot_core::plugins::manager::{GitInstaller, PluginManager};
use plugbot_core::plugins::EventContext;
use plugbot_core::sessions::InMemorySessions;
use tempfile::TempDir;

/// Keeps every reply pushed through it.
#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<Reply>>,
    pub cancelled: Mutex<Vec<String>>,
}

#[async_trait]
impl ReplyChannel for RecordingChannel {
    async fn send(&self, reply: Reply, _context: &Context) -> Result<(), Error> {
        self.sent.lock().push(reply);
        Ok(())
    }

    fn cancel_session(&self, session_id: &str) {
        self.cancelled.lock().push(session_id.to_string());
    }

    fn cancel_all_sessions(&self) {
        self.cancelled.lock().push("*".to_string());
    }
}

#[derive(Default)]
pub struct FlagLogControl {
    debug: AtomicBool,
}

impl LogControl for FlagLogControl {
    fn is_debug(&self) -> bool {
        self.debug.load(Ordering::SeqCst)
    }

    fn set_debug(&self, enabled: bool) -> Result<(), Error> {
        self.debug.store(enabled, Ordering::SeqCst);
        Ok(())
    }
}

/// A plugin manager with Godcmd registered over a temp directory.
pub struct Harness {
    pub dir: TempDir,
    pub config: Arc<ConfigHandle>,
    pub backend: Arc<InMemorySessions>,
    pub user_data: Arc<UserDataStore>,
    pub log_control: Arc<FlagLogControl>,
    pub manager: Arc<PluginManager>,
    pub channel: Arc<RecordingChannel>,
    pub godcmd: Arc<Godcmd>,
}

pub fn write_godcmd_config(dir: &Path, config: &GodcmdConfig) {
    PluginConfigStore::new(dir.join("plugins")).save("Godcmd", config).unwrap();
}

impl Harness {
    pub fn new(bot: BotConfig) -> Self {
        Self::with_dir(tempfile::tempdir().unwrap(), bot)
    }

    /// Uses `dir` as is, so config files can be written beforehand.
    pub fn with_dir(dir: TempDir, bot: BotConfig) -> Self {
        Self::with_config(dir, ConfigHandle::in_memory(bot))
    }

    pub fn with_config(dir: TempDir, config: ConfigHandle) -> Self {
        let plugin_dir = dir.path().join("plugins");
        let config = Arc::new(config);
        let backend = Arc::new(InMemorySessions::new("openAI"));
        let user_data = Arc::new(UserDataStore::new());
        let log_control = Arc::new(FlagLogControl::default());
        let manager = Arc::new(PluginManager::new(&plugin_dir, Box::new(GitInstaller)));
        let godcmd = Arc::new(
            Godcmd::new(
                config.clone(),
                PluginConfigStore::new(&plugin_dir),
                backend.clone(),
                user_data.clone(),
                log_control.clone(),
            )
            .unwrap(),
        );
        manager.register(godcmd.clone()).unwrap();
        Self {
            dir,
            config,
            backend,
            user_data,
            log_control,
            manager,
            channel: Arc::new(RecordingChannel::default()),
            godcmd,
        }
    }

    pub fn store(&self) -> PluginConfigStore {
        PluginConfigStore::new(self.dir.path().join("plugins"))
    }

    pub async fn send(&self, context: Context) -> EventContext {
        self.manager.emit(context, self.channel.clone()).await
    }

    /// Private text from `user`.
    pub async fn say(&self, user: &str, content: &str) -> EventContext {
        self.send(Context::text(content, user)).await
    }

    /// Makes `user` an admin through the configured password.
    pub async fn login(&self, user: &str, password: &str) {
        let ectx = self.say(user, &format!("#auth {}", password)).await;
        assert_eq!(ectx.reply.map(|r| r.content), Some("认证成功".to_string()));
    }
}

pub fn reply_text(ectx: &EventContext) -> String {
    ectx.reply.as_ref().map(|r| r.content.clone()).unwrap_or_default()
}
