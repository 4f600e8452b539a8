//! NiceSuno: music and lyrics through a pool of Suno API accounts.

pub mod accounts;
pub mod client;
pub mod prompt;
pub mod worker;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use plugbot_common::models::{PluginMeta, Reply};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::Error;
use crate::config::PluginConfigStore;
use crate::plugins::{EventAction, EventContext, HelpRequest, Plugin};
use crate::tasks::JobHandle;

pub use accounts::{AccountPool, AccountRecord, RequestKind};
pub use client::{SunoApi, SunoClient};
pub use prompt::{CreateRequest, MusicPrompt};
pub use worker::{LyricsWorker, MusicWorker, PollSettings, APOLOGY};

use client::{CustomModeRequest, UpstreamDetail};

pub const PLUGIN_NAME: &str = "NiceSuno";

fn default_output_dir() -> String {
    "/tmp".to_string()
}
fn default_true() -> bool {
    true
}
fn default_daily_limit() -> u32 {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NiceSunoConfig {
    #[serde(default)]
    pub suno_api_bases: Vec<String>,
    #[serde(default)]
    pub music_create_prefixes: Vec<String>,
    #[serde(default)]
    pub instrumental_create_prefixes: Vec<String>,
    #[serde(default)]
    pub lyrics_create_prefixes: Vec<String>,
    #[serde(default = "default_output_dir")]
    pub music_output_dir: String,
    #[serde(default = "default_true")]
    pub is_send_lyrics: bool,
    #[serde(default = "default_true")]
    pub is_send_covers: bool,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
}

impl Default for NiceSunoConfig {
    fn default() -> Self {
        Self {
            suno_api_bases: Vec::new(),
            music_create_prefixes: Vec::new(),
            instrumental_create_prefixes: Vec::new(),
            lyrics_create_prefixes: Vec::new(),
            music_output_dir: default_output_dir(),
            is_send_lyrics: true,
            is_send_covers: true,
            daily_limit: default_daily_limit(),
        }
    }
}

impl NiceSunoConfig {
    /// Without endpoints or music prefixes the plugin stays silent.
    pub fn is_active(&self) -> bool {
        !self.suno_api_bases.is_empty() && !self.music_create_prefixes.is_empty()
    }
}

pub struct NiceSuno {
    meta: PluginMeta,
    config: RwLock<NiceSunoConfig>,
    accounts: RwLock<Arc<AccountPool>>,
    api: Arc<dyn SunoApi>,
    store: PluginConfigStore,
    poll: PollSettings,
    jobs: Mutex<Vec<JobHandle>>,
}

impl NiceSuno {
    pub fn new(store: PluginConfigStore, api: Arc<dyn SunoApi>) -> Result<Self, Error> {
        let config = store.load::<NiceSunoConfig>(PLUGIN_NAME)?.unwrap_or_else(|| {
            debug!("[Nicesuno] config.json not found, using defaults");
            NiceSunoConfig::default()
        });
        Self::with_config(config, store, api)
    }

    pub fn with_config(config: NiceSunoConfig, store: PluginConfigStore, api: Arc<dyn SunoApi>) -> Result<Self, Error> {
        Self::prepare(&config)?;
        let accounts = AccountPool::new(&config.suno_api_bases, config.daily_limit);
        Ok(Self {
            meta: PluginMeta {
                name: PLUGIN_NAME.to_string(),
                namecn: None,
                desc: "使用Suno创作音乐。".to_string(),
                version: "1.5".to_string(),
                author: "空心菜".to_string(),
                desire_priority: 100,
                hidden: false,
            },
            config: RwLock::new(config),
            accounts: RwLock::new(Arc::new(accounts)),
            api,
            store,
            poll: PollSettings::default(),
            jobs: Mutex::new(Vec::new()),
        })
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    fn prepare(config: &NiceSunoConfig) -> Result<(), Error> {
        let out = PathBuf::from(&config.music_output_dir);
        if !out.exists() {
            info!("[Nicesuno] music_output_dir={} not exists, create it.", config.music_output_dir);
            fs::create_dir_all(&out)?;
        }
        if config.is_active() {
            info!("[Nicesuno] inited");
        } else {
            warn!("[Nicesuno] init failed because suno_api_bases or music_create_prefixes is incorrect.");
        }
        Ok(())
    }

    pub fn accounts(&self) -> Arc<AccountPool> {
        self.accounts.read().clone()
    }

    /// Hands over the jobs spawned so far.
    pub fn take_jobs(&self) -> Vec<JobHandle> {
        std::mem::take(&mut *self.jobs.lock())
    }

    fn track(&self, job: JobHandle) {
        let mut jobs = self.jobs.lock();
        jobs.retain(|j| !j.is_finished());
        jobs.push(job);
    }

    async fn create_music(&self, ectx: &mut EventContext, config: &NiceSunoConfig, prompt: &str, instrumental: bool) -> Result<(), Error> {
        let pool = self.accounts();
        let Some(base) = pool.select(RequestKind::Create) else {
            warn!("[Nicesuno] no available account to create music, ignored.");
            ectx.finish(Reply::text("抱歉！没有可用的Suno账号，请稍后再试🥺"));
            return Ok(());
        };
        info!("[Nicesuno] current suno_api_base={}", base);

        let kind = if instrumental { "instrumental" } else { "vocal" };
        let response = match prompt::classify_music_prompt(prompt) {
            MusicPrompt::Malformed => {
                warn!("[Nicesuno] custom mode prompt has a wrong format: {}", prompt);
                pool.release(&base);
                ectx.finish(Reply::text(self.help_text(HelpRequest { verbose: true, ..HelpRequest::default() })));
                return Ok(());
            }
            MusicPrompt::Custom { title, tags, lyrics } => {
                info!("[Nicesuno] generating {} music in custom mode, title={:?}, tags={:?}", kind, title, tags);
                let request = CustomModeRequest::new(title, tags, lyrics, instrumental);
                self.api.generate_custom(&base, &request).await
            }
            MusicPrompt::Description(description) => {
                info!("[Nicesuno] generating {} music with description={}", kind, description);
                self.api.generate_with_description(&base, &description, instrumental).await
            }
        };

        let reply = match response {
            Err(e) => {
                warn!("[Nicesuno] music generation request failed: {}", e);
                pool.record_failure(&base, RequestKind::Create, &e.to_string());
                Reply::text("因为神秘原因，音乐创作失败😂请稍后再重试...")
            }
            Ok(resp) => match resp.detail() {
                Some(detail) => {
                    warn!("[Nicesuno] music generation rejected: {}", detail);
                    pool.record_failure(&base, RequestKind::Create, &detail);
                    Reply::text(UpstreamDetail::parse(&detail).music_message())
                }
                None if resp.clips.is_empty() => {
                    warn!("[Nicesuno] no clips in music generation response");
                    pool.release(&base);
                    Reply::text("因为神秘原因，音乐创作异常😂请稍后再重试...")
                }
                None => {
                    pool.record_success(&base, RequestKind::Create);
                    let clip_ids: Vec<String> = resp.clips.into_iter().map(|c| c.id).collect();
                    debug!("[Nicesuno] start to handle music, ids={:?}", clip_ids);
                    let job = MusicWorker {
                        api: self.api.clone(),
                        channel: ectx.channel.clone(),
                        context: ectx.context.clone(),
                        base: base.clone(),
                        clip_ids,
                        output_dir: PathBuf::from(&config.music_output_dir),
                        send_lyrics: config.is_send_lyrics,
                        send_covers: config.is_send_covers,
                        poll: self.poll,
                    }
                    .spawn();
                    self.track(job);
                    Reply::text(format!("{}正在为您创作音乐，请稍等☕", ectx.context.msg.to_user_nickname))
                }
            },
        };
        ectx.finish(reply);
        Ok(())
    }

    async fn create_lyrics(&self, ectx: &mut EventContext, prompt: &str) -> Result<(), Error> {
        let pool = self.accounts();
        let Some(base) = pool.select(RequestKind::Read) else {
            warn!("[Nicesuno] no available account to create lyrics, ignored.");
            ectx.finish(Reply::text("抱歉！没有可用Suno账号，请稍后再试🥺"));
            return Ok(());
        };
        info!("[Nicesuno] current suno_api_base={}", base);

        let submission = match self.api.generate_lyrics(&base, prompt).await {
            Ok(s) => s,
            Err(e) => {
                warn!("[Nicesuno] lyrics generation request failed: {}", e);
                pool.record_failure(&base, RequestKind::Read, &e.to_string());
                ectx.finish(Reply::text("因为神秘原因，歌词创作失败😂请稍后再重试..."));
                return Ok(());
            }
        };
        if let Some(detail) = submission.detail() {
            warn!("[Nicesuno] lyrics generation rejected: {}", detail);
            pool.record_failure(&base, RequestKind::Read, &detail);
            ectx.finish(Reply::text(UpstreamDetail::parse(&detail).lyrics_message()));
            return Ok(());
        }
        let Some(lyrics_id) = submission.id else {
            ectx.finish(Reply::text("因为神秘原因，歌词创作失败😂请稍后再重试..."));
            return Ok(());
        };

        pool.record_success(&base, RequestKind::Read);
        debug!("[Nicesuno] start to handle lyrics, id={}", lyrics_id);
        let job = LyricsWorker {
            api: self.api.clone(),
            channel: ectx.channel.clone(),
            context: ectx.context.clone(),
            base,
            lyrics_id,
            prompt: prompt.to_string(),
            poll: self.poll,
        }
        .spawn();
        self.track(job);
        ectx.action = EventAction::BreakPass;
        Ok(())
    }
}

#[async_trait]
impl Plugin for NiceSuno {
    fn meta(&self) -> &PluginMeta {
        &self.meta
    }

    async fn on_handle_context(&self, ectx: &mut EventContext) -> Result<(), Error> {
        if !ectx.context.is_text() {
            return Ok(());
        }
        let config = self.config.read().clone();
        if !config.is_active() {
            return Ok(());
        }
        let content = ectx.context.content.clone();
        debug!("[Nicesuno] on_handle_context.");

        let lower = content.trim().to_lowercase();
        if let Some(action) = lower.strip_prefix("&suno") {
            let reply = match action.trim() {
                "view" | "read" | "info" | "" => Reply::info(self.accounts().info()),
                _ => Reply::error("指令有误，当前仅支持&sunoinfo指令！"),
            };
            ectx.finish(reply);
            return Ok(());
        }

        let Some(request) = prompt::detect(&content, &config) else {
            debug!("[Nicesuno] content starts without any suno prefixes or prompt, ignored.");
            return Ok(());
        };
        let result = match request {
            CreateRequest::Music { prompt, instrumental } => self.create_music(ectx, &config, &prompt, instrumental).await,
            CreateRequest::Lyrics { prompt } => {
                info!("[Nicesuno] start generating lyrics, prompt={}", prompt);
                self.create_lyrics(ectx, &prompt).await
            }
        };
        if let Err(e) = result {
            warn!("[Nicesuno] failed to generate music, error={}", e);
            ectx.finish(Reply::text(APOLOGY));
        }
        Ok(())
    }

    fn help_text(&self, req: HelpRequest) -> String {
        let mut text = String::from("使用Suno创作音乐。");
        if !req.verbose {
            return text;
        }
        let config = self.config.read();
        let join = |p: &[String]| p.join("/");
        let music = join(&config.music_create_prefixes);
        let instrumental = join(&config.instrumental_create_prefixes);
        let lyrics = join(&config.lyrics_create_prefixes);
        let example = |p: &[String]| p.first().cloned().unwrap_or_default();
        text.push_str(&format!(
            "\n1.创作声乐\n用法：{music}<提示词>\n示例：{}明天会更好。\n\n2.创作器乐\n用法：{instrumental}<提示词>\n示例：{}明天会更好。\n\n3.创作歌词\n用法：{lyrics}<提示词>\n示例：{}明天会更好。\n\n4.自定义模式\n用法：\n{music}/{instrumental}\n标题: <标题>\n风格: <风格1> <风格2> ...\n<歌词>\n备注：前三行必须为创作前缀、标题、风格，<标题><风格><歌词>三个值可以为空，但<风格><歌词>不可同时为空！",
            example(&config.music_create_prefixes),
            example(&config.instrumental_create_prefixes),
            example(&config.lyrics_create_prefixes),
        ));
        text
    }

    /// Re-reads config.json; the account pool is rebuilt when endpoints or limits change.
    fn reload(&self) -> Result<(), Error> {
        let Some(fresh) = self.store.load::<NiceSunoConfig>(PLUGIN_NAME)? else {
            return Ok(());
        };
        Self::prepare(&fresh)?;
        let mut config = self.config.write();
        if fresh.suno_api_bases != config.suno_api_bases || fresh.daily_limit != config.daily_limit {
            *self.accounts.write() = Arc::new(AccountPool::new(&fresh.suno_api_bases, fresh.daily_limit));
        }
        *config = fresh;
        Ok(())
    }
}
