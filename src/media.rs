//! External collaborators: the host's media element, asset fetching, source
//! resolution and decoding.
//!
//! The engine only sees these traits. Hosts plug in their own element and
//! transport; this module also ships in-process implementations used for
//! offline rendering and tests, and HTTP ones behind the `remote` feature.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use crate::dsp::buffer::AudioBuffer;
use crate::dsp::mixer::StereoBlock;
use crate::error::{DecodeError, EngineError, FetchError, ResolveError};

// ── Media element ───────────────────────────────────────────

/// The native, rate-controlled media element.
///
/// Its own rate control does not shift pitch. When it is the active producer
/// the graph pulls its audio through [`MediaElement::render`].
pub trait MediaElement {
    /// URL the element is playing.
    fn src(&self) -> &str;
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, seconds: f64);
    fn duration(&self) -> Option<f64>;
    fn is_paused(&self) -> bool;
    fn play(&mut self) -> crate::error::Result<()>;
    fn pause(&mut self);
    fn playback_rate(&self) -> f64;
    fn set_playback_rate(&mut self, rate: f64);
    /// Add one block of the element's output into `out`.
    fn render(&mut self, out: &mut StereoBlock, sample_rate: f64);
}

/// Transport events raised by the element's own controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEvent {
    Play,
    Pause,
    Seeked,
}

/// In-process element over a decoded buffer.
///
/// Rate changes are plain resampling, which is close enough for the small
/// deviations the native path is used for.
#[derive(Debug, Clone)]
pub struct PcmMediaElement {
    src: String,
    buffer: Arc<AudioBuffer>,
    /// Read position in buffer frames.
    position: f64,
    paused: bool,
    rate: f64,
}

impl PcmMediaElement {
    pub fn new(src: impl Into<String>, buffer: Arc<AudioBuffer>) -> Self {
        PcmMediaElement {
            src: src.into(),
            buffer,
            position: 0.0,
            paused: true,
            rate: 1.0,
        }
    }
}

impl MediaElement for PcmMediaElement {
    fn src(&self) -> &str {
        &self.src
    }

    fn current_time(&self) -> f64 {
        self.position / self.buffer.sample_rate().max(1) as f64
    }

    fn set_current_time(&mut self, seconds: f64) {
        let frames = self.buffer.frames() as f64;
        self.position = (seconds.max(0.0) * self.buffer.sample_rate() as f64).min(frames);
    }

    fn duration(&self) -> Option<f64> {
        Some(self.buffer.duration())
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn play(&mut self) -> crate::error::Result<()> {
        if self.position >= self.buffer.frames() as f64 {
            self.position = 0.0;
        }
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn playback_rate(&self) -> f64 {
        self.rate
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.rate = rate;
    }

    fn render(&mut self, out: &mut StereoBlock, sample_rate: f64) {
        if self.paused {
            return;
        }
        let frames = self.buffer.frames() as f64;
        let step = self.rate * self.buffer.sample_rate() as f64 / sample_rate;
        for i in 0..out.frames() {
            if self.position >= frames {
                self.position = frames;
                self.paused = true;
                break;
            }
            let (l, r) = self.buffer.read_frame(self.position);
            out.left[i] += l;
            out.right[i] += r;
            self.position += step;
        }
    }
}

// ── Source identifiers ──────────────────────────────────────

static SOURCE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^https?://(www\.)?youtube\.com/watch\?v=[\w-]+",
        r"^https?://(www\.)?youtu\.be/[\w-]+",
        r"^https?://(www\.)?youtube\.com/embed/[\w-]+",
        r"^https?://(www\.)?youtube\.com/v/[\w-]+",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// A validated source identifier, ready to hand to a [`MediaResolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource(String);

impl MediaSource {
    /// Validate a user-supplied URL. Surrounding whitespace is ignored.
    pub fn parse(input: &str) -> Result<Self, EngineError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || !SOURCE_PATTERNS.iter().any(|re| re.is_match(trimmed)) {
            return Err(EngineError::InvalidSource(trimmed.to_string()));
        }
        Ok(MediaSource(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Join a possibly relative URL onto a base.
pub fn join_url(base: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        url.trim_start_matches('/')
    )
}

// ── Collaborator traits ─────────────────────────────────────

/// Turns a source identifier into a playable media URL.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, source: &MediaSource) -> Result<String, ResolveError>;
}

/// Fetches raw bytes for a URL.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// The platform decode primitive: encoded bytes to PCM.
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<AudioBuffer, DecodeError>;
}

/// Fetcher serving assets from memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    assets: HashMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(url, bytes);
        self
    }

    pub fn insert(&mut self, url: impl Into<String>, bytes: Vec<u8>) {
        self.assets.insert(url.into(), bytes);
    }
}

#[async_trait]
impl MediaFetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.assets
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(url.to_string()))
    }
}

// ── HTTP collaborators ──────────────────────────────────────

#[cfg(feature = "remote")]
pub use remote::{HttpFetcher, HttpResolver};

#[cfg(feature = "remote")]
mod remote {
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    use super::{join_url, MediaFetcher, MediaResolver, MediaSource};
    use crate::error::{FetchError, ResolveError};

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct ExtractRequest<'a> {
        youtube_url: &'a str,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct ExtractResponse {
        #[serde(default)]
        success: bool,
        #[serde(default)]
        audio_url: Option<String>,
        #[serde(default)]
        error: Option<String>,
    }

    /// Resolver backed by the audio extraction service (`POST /extract-audio`).
    #[derive(Debug, Clone)]
    pub struct HttpResolver {
        base_url: String,
        client: reqwest::Client,
    }

    impl HttpResolver {
        pub fn new(base_url: impl Into<String>) -> Self {
            HttpResolver {
                base_url: base_url.into(),
                client: reqwest::Client::new(),
            }
        }
    }

    #[async_trait]
    impl MediaResolver for HttpResolver {
        async fn resolve(&self, source: &MediaSource) -> Result<String, ResolveError> {
            let endpoint = join_url(&self.base_url, "/extract-audio");
            let response = self
                .client
                .post(&endpoint)
                .json(&ExtractRequest {
                    youtube_url: source.as_str(),
                })
                .send()
                .await
                .map_err(|e| ResolveError::Transport(e.to_string()))?;
            let body: ExtractResponse = response
                .json()
                .await
                .map_err(|e| ResolveError::Transport(e.to_string()))?;
            match (body.success, body.audio_url) {
                (true, Some(url)) => Ok(join_url(&self.base_url, &url)),
                _ => Err(ResolveError::Rejected(
                    body.error
                        .unwrap_or_else(|| "Failed to extract audio".to_string()),
                )),
            }
        }
    }

    /// Fetcher issuing plain GET requests, resolving relative URLs against a base.
    #[derive(Debug, Clone)]
    pub struct HttpFetcher {
        base_url: String,
        client: reqwest::Client,
    }

    impl HttpFetcher {
        pub fn new(base_url: impl Into<String>) -> Self {
            HttpFetcher {
                base_url: base_url.into(),
                client: reqwest::Client::new(),
            }
        }
    }

    #[async_trait]
    impl MediaFetcher for HttpFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            let full = join_url(&self.base_url, url);
            let request_failed = |e: reqwest::Error| FetchError::Request {
                url: full.clone(),
                reason: e.to_string(),
            };
            let response = self
                .client
                .get(&full)
                .send()
                .await
                .map_err(request_failed)?;
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(FetchError::NotFound(full.clone()));
            }
            let bytes = response
                .error_for_status()
                .map_err(request_failed)?
                .bytes()
                .await
                .map_err(request_failed)?;
            Ok(bytes.to_vec())
        }
    }
}
