//! Turning a chat line into a music or lyrics request.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::plugins::nicesuno::NiceSunoConfig;

static CUSTOM_MODE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?s)^ *标题[:：]?(?P<title>[\S ]*)\n+ *风格[:：]?(?P<tags>[\S ]*)(\n+(?P<lyrics>.*))?$").ok()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateRequest {
    Music { prompt: String, instrumental: bool },
    Lyrics { prompt: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MusicPrompt {
    Description(String),
    Custom {
        title: Option<String>,
        tags: Option<String>,
        lyrics: Option<String>,
    },
    /// Looked like custom mode but had neither tags nor lyrics.
    Malformed,
}

pub fn match_prefix<'a>(content: &str, prefixes: &'a [String]) -> Option<&'a str> {
    prefixes
        .iter()
        .map(String::as_str)
        .find(|p| !p.is_empty() && content.starts_with(p))
}

/// Prefix lists are tried in order: music, instrumental, lyrics.
/// Returns `None` when no prefix matches or the prompt is blank.
pub fn detect(content: &str, config: &NiceSunoConfig) -> Option<CreateRequest> {
    let tail = |prefix: &str| content[prefix.len()..].trim().to_string();
    let request = if let Some(p) = match_prefix(content, &config.music_create_prefixes) {
        CreateRequest::Music { prompt: tail(p), instrumental: false }
    } else if let Some(p) = match_prefix(content, &config.instrumental_create_prefixes) {
        CreateRequest::Music { prompt: tail(p), instrumental: true }
    } else if let Some(p) = match_prefix(content, &config.lyrics_create_prefixes) {
        CreateRequest::Lyrics { prompt: tail(p) }
    } else {
        return None;
    };
    let prompt = match &request {
        CreateRequest::Music { prompt, .. } | CreateRequest::Lyrics { prompt } => prompt,
    };
    (!prompt.is_empty()).then_some(request)
}

fn non_empty(m: Option<regex::Match<'_>>) -> Option<String> {
    m.map(|m| m.as_str().trim().to_string()).filter(|s| !s.is_empty())
}

/// Custom mode needs 标题 and 风格 and more than two lines.
pub fn classify_music_prompt(prompt: &str) -> MusicPrompt {
    let custom = prompt.contains("标题") && prompt.contains("风格") && prompt.split('\n').count() > 2;
    if !custom {
        return MusicPrompt::Description(prompt.to_string());
    }
    let Some(caps) = CUSTOM_MODE.as_ref().and_then(|re| re.captures(prompt)) else {
        return MusicPrompt::Malformed;
    };
    let title = non_empty(caps.name("title"));
    let tags = non_empty(caps.name("tags"));
    let lyrics = non_empty(caps.name("lyrics"));
    if tags.is_none() && lyrics.is_none() {
        return MusicPrompt::Malformed;
    }
    MusicPrompt::Custom { title, tags, lyrics }
}

/// Filesystem-safe title: reserved characters and spaces removed, at most 20 chars.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ' '))
        .take(20)
        .collect()
}
