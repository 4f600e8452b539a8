//! Suno API access. `SunoApi` is the seam; `SunoClient` talks HTTP.

use std::path::Path;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::Error;
use crate::http::{build_client, with_retries, RetryPolicy};

pub const MODEL_VERSION: &str = "chirp-v3-0";

fn detail_text(detail: &Option<Value>) -> Option<String> {
    match detail {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ClipMetadata {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub gpt_description_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Clip {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub metadata: ClipMetadata,
}

fn present(url: &Option<String>) -> Option<&str> {
    url.as_deref().filter(|u| !u.is_empty())
}

impl Clip {
    pub fn audio(&self) -> Option<&str> {
        present(&self.audio_url)
    }

    pub fn image(&self) -> Option<&str> {
        present(&self.image_url)
    }

    pub fn video(&self) -> Option<&str> {
        present(&self.video_url)
    }
}

/// Reply to both music generation endpoints.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub detail: Option<Value>,
    #[serde(default)]
    pub clips: Vec<Clip>,
}

impl GenerateResponse {
    pub fn detail(&self) -> Option<String> {
        detail_text(&self.detail)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LyricsSubmission {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub detail: Option<Value>,
}

impl LyricsSubmission {
    pub fn detail(&self) -> Option<String> {
        detail_text(&self.detail)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Lyrics {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
}

impl Lyrics {
    pub fn is_complete(&self) -> bool {
        self.status == "complete"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptionModeRequest {
    pub gpt_description_prompt: String,
    pub make_instrumental: bool,
    pub mv: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomModeRequest {
    pub title: Option<String>,
    pub tags: Option<String>,
    pub prompt: Option<String>,
    pub make_instrumental: bool,
    pub mv: String,
    pub continue_clip_id: Option<String>,
    pub continue_at: Option<f64>,
}

impl CustomModeRequest {
    pub fn new(title: Option<String>, tags: Option<String>, lyrics: Option<String>, make_instrumental: bool) -> Self {
        Self {
            title,
            tags,
            prompt: lyrics,
            make_instrumental,
            mv: MODEL_VERSION.to_string(),
            continue_clip_id: None,
            continue_at: None,
        }
    }
}

/// Known `detail` values of an upstream error body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamDetail {
    InsufficientCredits,
    Unauthorized,
    TopicTooLong,
    TooManyJobs,
    Other(String),
}

impl UpstreamDetail {
    pub fn parse(detail: &str) -> Self {
        match detail {
            "Insufficient credits." => Self::InsufficientCredits,
            "Unauthorized" => Self::Unauthorized,
            "Topic too long." => Self::TopicTooLong,
            "Too many running jobs." => Self::TooManyJobs,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn music_message(&self) -> String {
        match self {
            Self::InsufficientCredits => "因为当前账号超过限额，音乐创作失败😂请重试一次好不好😘".to_string(),
            Self::Unauthorized => "因为Suno-API登录失效，音乐创作失败😂请更新Suno-API的SessionID和Cookie...".to_string(),
            Self::TopicTooLong => "因为废话太多，音乐创作失败😂请精简后再重试...".to_string(),
            Self::TooManyJobs => "因为创作任务过多，音乐创作失败😂请稍等片刻再重试...".to_string(),
            Self::Other(detail) => format!("因为{}，音乐创作失败😂请稍后再重试...", detail),
        }
    }

    /// Lyrics cost no credits, so that detail has no message of its own.
    pub fn lyrics_message(&self) -> String {
        match self {
            Self::Unauthorized => "因为Suno-API登录失效，歌词创作失败😂请更新Suno-API的SessionID和Cookie...".to_string(),
            Self::TopicTooLong => "因为废话太多，歌词创作失败😂请精简后再重试...".to_string(),
            Self::TooManyJobs => "因为创作任务过多，歌词创作失败😂请稍等片刻再重试...".to_string(),
            Self::InsufficientCredits => "因为Insufficient credits.，歌词创作失败😂请稍后再重试...".to_string(),
            Self::Other(detail) => format!("因为{}，歌词创作失败😂请稍后再重试...", detail),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SunoApi: Send + Sync {
    async fn generate_with_description(&self, base: &str, description: &str, instrumental: bool) -> Result<GenerateResponse, Error>;

    async fn generate_custom(&self, base: &str, request: &CustomModeRequest) -> Result<GenerateResponse, Error>;

    /// First clip of `GET /feed/{id}`.
    async fn get_clip(&self, base: &str, id: &str) -> Result<Clip, Error>;

    async fn generate_lyrics(&self, base: &str, prompt: &str) -> Result<LyricsSubmission, Error>;

    async fn get_lyrics(&self, base: &str, id: &str) -> Result<Lyrics, Error>;

    async fn download(&self, url: &str, dest: &Path) -> Result<(), Error>;
}

/// `SunoApi` over reqwest. Generation calls run once; polling and
/// downloads follow `retry`.
#[derive(Clone)]
pub struct SunoClient {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl SunoClient {
    pub fn new() -> Result<Self, Error> {
        Ok(Self { client: build_client()?, retry: RetryPolicy::default() })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn checked(response: reqwest::Response, what: &str) -> Result<reqwest::Response, Error> {
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!("{} returned status {}", what, status.as_u16())));
        }
        Ok(response)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(&self, url: &str, body: &B) -> Result<T, Error> {
        let response = self.client.post(url).json(body).send().await?;
        let text = Self::checked(response, url)?.text().await?;
        debug!("[Nicesuno] POST {} -> {}", url, text);
        Ok(serde_json::from_str(&text)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, Error> {
        let response = self.client.get(url).send().await?;
        let text = Self::checked(response, url)?.text().await?;
        debug!("[Nicesuno] GET {} -> {}", url, text);
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl SunoApi for SunoClient {
    async fn generate_with_description(&self, base: &str, description: &str, instrumental: bool) -> Result<GenerateResponse, Error> {
        let body = DescriptionModeRequest {
            gpt_description_prompt: description.to_string(),
            make_instrumental: instrumental,
            mv: MODEL_VERSION.to_string(),
        };
        self.post_json(&format!("{}/generate/description-mode", base), &body).await
    }

    async fn generate_custom(&self, base: &str, request: &CustomModeRequest) -> Result<GenerateResponse, Error> {
        self.post_json(&format!("{}/generate", base), request).await
    }

    async fn get_clip(&self, base: &str, id: &str) -> Result<Clip, Error> {
        let url = format!("{}/feed/{}", base, id);
        with_retries(self.retry, "[Nicesuno] get clip", || async {
            let clips: Vec<Clip> = self.get_json(&url).await?;
            clips
                .into_iter()
                .next()
                .ok_or_else(|| Error::Upstream(format!("feed for {} is empty", id)))
        })
        .await
    }

    async fn generate_lyrics(&self, base: &str, prompt: &str) -> Result<LyricsSubmission, Error> {
        let url = format!("{}/generate/lyrics/", base);
        let body = serde_json::json!({ "prompt": prompt });
        with_retries(self.retry, "[Nicesuno] generate lyrics", || self.post_json(&url, &body)).await
    }

    async fn get_lyrics(&self, base: &str, id: &str) -> Result<Lyrics, Error> {
        let url = format!("{}/lyrics/{}", base, id);
        with_retries(self.retry, "[Nicesuno] get lyrics", || self.get_json(&url)).await
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<(), Error> {
        with_retries(self.retry, "[Nicesuno] download", || async {
            let response = self.client.get(url).send().await?;
            let bytes = Self::checked(response, url)?.bytes().await?;
            tokio::fs::write(dest, &bytes).await?;
            Ok(())
        })
        .await
    }
}
