//! Background delivery of finished songs and lyrics.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use plugbot_common::models::{Context, Reply, ReplyKind};
use plugbot_common::traits::ReplyChannel;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::Error;
use crate::plugins::nicesuno::client::{Clip, SunoApi};
use crate::plugins::nicesuno::prompt::sanitize_title;
use crate::tasks::{spawn_job, JobHandle};

pub const APOLOGY: &str = "抱歉！创作失败了，请稍后再试🥺";

/// Polling cadence and deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Wait before the first music poll.
    pub initial_delay: Duration,
    pub interval: Duration,
    pub video_interval: Duration,
    pub music_timeout: Duration,
    pub cover_timeout: Duration,
    pub video_timeout: Duration,
    pub lyrics_timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(15),
            interval: Duration::from_secs(5),
            video_interval: Duration::from_secs(10),
            music_timeout: Duration::from_secs(180),
            cover_timeout: Duration::from_secs(60),
            video_timeout: Duration::from_secs(180),
            lyrics_timeout: Duration::from_secs(120),
        }
    }
}

enum Polled {
    Ready(Clip),
    Unavailable(Error),
    TimedOut,
}

/// Sends an apology if `work` fails, then reports the outcome.
async fn with_apology(channel: Arc<dyn ReplyChannel>, context: Context, work: impl Future<Output = Result<(), Error>>) -> Result<(), Error> {
    let result = work.await;
    if let Err(e) = &result {
        warn!("[Nicesuno] background job failed: {}", e);
        if let Err(send_err) = channel.send(Reply::text(APOLOGY), &context).await {
            warn!("[Nicesuno] could not deliver apology: {}", send_err);
        }
    }
    result
}

/// `{unix}-{clip id}-{title}.mp3`; clips of one job usually share a title.
pub fn audio_file_name(timestamp: i64, clip_id: &str, title: &str) -> String {
    let id: String = clip_id.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '-').collect();
    format!("{}-{}-{}.mp3", timestamp, id, sanitize_title(title))
}

pub struct MusicWorker {
    pub api: Arc<dyn SunoApi>,
    pub channel: Arc<dyn ReplyChannel>,
    pub context: Context,
    pub base: String,
    pub clip_ids: Vec<String>,
    pub output_dir: PathBuf,
    pub send_lyrics: bool,
    pub send_covers: bool,
    pub poll: PollSettings,
}

impl MusicWorker {
    pub fn spawn(self) -> JobHandle {
        let channel = self.channel.clone();
        let context = self.context.clone();
        spawn_job("suno-music", with_apology(channel, context, self.run()))
    }

    async fn send(&self, reply: Reply) -> Result<(), Error> {
        self.channel.send(reply, &self.context).await
    }

    /// Polls until `ready`, or until `timeout` has passed since `started`.
    async fn poll_clip(&self, id: &str, started: Instant, timeout: Duration, interval: Duration, ready: impl Fn(&Clip) -> bool) -> Polled {
        loop {
            match self.api.get_clip(&self.base, id).await {
                Err(e) => return Polled::Unavailable(e),
                Ok(clip) if ready(&clip) => return Polled::Ready(clip),
                Ok(_) if started.elapsed() > timeout => return Polled::TimedOut,
                Ok(_) => sleep(interval).await,
            }
        }
    }

    fn lyrics_text(&self, clip: &Clip, lyrics: &str) -> String {
        let meta = &clip.metadata;
        let description = meta
            .gpt_description_prompt
            .as_deref()
            .filter(|d| !d.is_empty())
            .unwrap_or("自定义模式不展示");
        format!(
            "🎻{}🎻\n\n{}\n\n🎹风格: {}\n👶发起人：{}\n🍀制作人：Suno\n🎤提示词: {}",
            clip.title.as_deref().unwrap_or_default(),
            lyrics,
            meta.tags.as_deref().unwrap_or_default(),
            self.context.msg.requester_nickname(),
            description,
        )
    }

    pub async fn run(self) -> Result<(), Error> {
        let poll = self.poll;
        let mut last_lyrics = String::new();
        let mut initial_delay = Some(poll.initial_delay);

        for id in &self.clip_ids {
            // The initial wait counts toward the first clip's deadline.
            let started = Instant::now();
            if let Some(delay) = initial_delay.take() {
                sleep(delay).await;
            }
            let clip = match self.poll_clip(id, started, poll.music_timeout, poll.interval, |c| c.audio().is_some()).await {
                Polled::Ready(clip) => clip,
                Polled::Unavailable(e) => return Err(e),
                Polled::TimedOut => return Err(Error::Timeout(format!("audio of clip {}", id))),
            };
            let audio_url = clip.audio().unwrap_or_default().to_string();

            let lyrics = clip.metadata.prompt.clone().unwrap_or_default();
            if !self.send_lyrics {
                debug!("[Nicesuno] lyrics delivery disabled");
            } else if lyrics == last_lyrics {
                debug!("[Nicesuno] lyrics unchanged since the previous clip, not sent again");
            } else {
                self.send(Reply::text(self.lyrics_text(&clip, &lyrics))).await?;
                last_lyrics = lyrics;
            }

            let title = clip.title.as_deref().unwrap_or_default();
            let audio_path = self.output_dir.join(audio_file_name(Utc::now().timestamp(), id, title));
            debug!("[Nicesuno] downloading {} to {:?}", audio_url, audio_path);
            self.api.download(&audio_url, &audio_path).await?;
            self.send(Reply::new(ReplyKind::File, audio_path.to_string_lossy())).await?;

            if self.send_covers {
                match self.poll_clip(id, Instant::now(), poll.cover_timeout, poll.interval, |c| c.image().is_some()).await {
                    Polled::Ready(clip) => {
                        let image = clip.image().unwrap_or_default().to_string();
                        self.send(Reply::new(ReplyKind::ImageUrl, image)).await?;
                    }
                    Polled::Unavailable(e) => warn!("[Nicesuno] cover of {} unavailable, skipped: {}", id, e),
                    Polled::TimedOut => warn!("[Nicesuno] cover of {} timed out, skipped", id),
                }
            }
        }

        let mut videos = Vec::with_capacity(self.clip_ids.len());
        for id in &self.clip_ids {
            let url = match self.poll_clip(id, Instant::now(), poll.video_timeout, poll.video_interval, |c| c.video().is_some()).await {
                Polled::Ready(clip) => clip.video().unwrap_or_default().to_string(),
                Polled::Unavailable(e) => {
                    warn!("[Nicesuno] video of {} unavailable: {}", id, e);
                    "获取失败！".to_string()
                }
                Polled::TimedOut => {
                    warn!("[Nicesuno] video of {} timed out", id);
                    "获取超时！".to_string()
                }
            };
            videos.push(url);
        }

        let video_text: Vec<String> = videos.iter().enumerate().map(|(i, url)| format!("视频{}: {}", i + 1, url)).collect();
        let mut text = format!(
            "{}已经为您创作了音乐，请查收！以下是音乐视频：\n{}",
            self.context.msg.to_user_nickname,
            video_text.join("\n")
        );
        if self.context.is_group {
            text = format!("@{}\n{}", self.context.msg.requester_nickname(), text);
        }
        self.send(Reply::text(text)).await
    }
}

pub struct LyricsWorker {
    pub api: Arc<dyn SunoApi>,
    pub channel: Arc<dyn ReplyChannel>,
    pub context: Context,
    pub base: String,
    pub lyrics_id: String,
    pub prompt: String,
    pub poll: PollSettings,
}

impl LyricsWorker {
    pub fn spawn(self) -> JobHandle {
        let channel = self.channel.clone();
        let context = self.context.clone();
        spawn_job("suno-lyrics", with_apology(channel, context, self.run()))
    }

    pub async fn run(self) -> Result<(), Error> {
        let started = Instant::now();
        let lyrics = loop {
            let lyrics = self.api.get_lyrics(&self.base, &self.lyrics_id).await?;
            if lyrics.is_complete() {
                break lyrics;
            }
            if started.elapsed() > self.poll.lyrics_timeout {
                return Err(Error::Timeout(format!("lyrics {}", self.lyrics_id)));
            }
            sleep(self.poll.interval).await;
        };
        let text = format!(
            "🎻{}🎻\n\n{}\n\n👶发起人：{}\n🍀制作人：Suno\n🎤提示词: {}",
            lyrics.title,
            lyrics.text,
            self.context.msg.requester_nickname(),
            self.prompt
        );
        self.channel.send(Reply::text(text), &self.context).await
    }
}
