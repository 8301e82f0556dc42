use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use url::Url;

use crate::core::config::resolve_api_key;
use crate::core::error::{http_error, UpstreamError};
use crate::core::story::{AssetCache, VoiceAsset};
use crate::core::voice::{Voice, VoiceCatalog, DEFAULT_VOICE_ID};
use crate::services::retry::RetryPolicy;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpeechConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub api_key: Option<String>,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_voice")]
    pub default_voice: String,
    /// Replaces the built-in narrator list when non-empty.
    #[serde(default)]
    pub voices: Vec<Voice>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            api_key: None,
            model_id: default_model_id(),
            base_url: default_base_url(),
            default_voice: default_voice(),
            voices: Vec::new(),
        }
    }
}

impl SpeechConfig {
    pub fn catalog(&self) -> VoiceCatalog {
        if self.voices.is_empty() {
            VoiceCatalog::default()
        } else {
            VoiceCatalog::new(self.voices.clone())
        }
    }
}

fn default_enabled() -> bool {
    true
}
fn default_model_id() -> String {
    "eleven_monolingual_v1".to_string()
}
fn default_base_url() -> String {
    "https://api.elevenlabs.io/v1".to_string()
}
fn default_voice() -> String {
    DEFAULT_VOICE_ID.to_string()
}

#[async_trait]
pub trait TtsClient: Send + Sync + Debug {
    /// Full audio for `text` spoken by `voice_id`, as one compressed blob.
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>>;
}

/// `None` when narration is disabled or no ElevenLabs key is available.
pub fn create_tts_client(config: &SpeechConfig) -> Option<Box<dyn TtsClient>> {
    if !config.enabled {
        return None;
    }
    let Some(api_key) = resolve_api_key(config.api_key.as_deref(), "ELEVENLABS_API_KEY") else {
        info!("No ElevenLabs API key found; narration is disabled");
        return None;
    };
    Some(Box::new(ElevenLabsClient::new(
        &api_key,
        &config.model_id,
        &config.base_url,
    )))
}

// --- ElevenLabs ---

#[derive(Debug)]
struct ElevenLabsClient {
    api_key: String,
    model_id: String,
    base_url: String,
    client: reqwest::Client,
}

impl ElevenLabsClient {
    fn new(api_key: &str, model_id: &str, base_url: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model_id: model_id.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// `{base}/text-to-speech/{voice_id}/stream`, with the voice id escaped.
    fn stream_url(&self, voice_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid ElevenLabs base URL: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("ElevenLabs base URL cannot take a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(["text-to-speech", voice_id, "stream"]);
        Ok(url)
    }
}

#[derive(Serialize)]
struct ElevenLabsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

#[async_trait]
impl TtsClient for ElevenLabsClient {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>> {
        let url = self.stream_url(voice_id)?;

        let resp = self
            .client
            .post(url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", VoiceAsset::MIME_TYPE)
            .json(&ElevenLabsRequest {
                text,
                model_id: &self.model_id,
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(http_error("ElevenLabs", resp).await);
        }

        let mut audio = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("ElevenLabs audio stream interrupted")?;
            audio.extend_from_slice(&chunk);
        }
        debug!("Received {} bytes of audio for voice {}", audio.len(), voice_id);
        Ok(audio)
    }
}

/// Speaks a story and keeps one recording per voice.
#[derive(Debug, Clone)]
pub struct Narrator {
    tts: Arc<dyn TtsClient>,
    retry: RetryPolicy,
}

impl Narrator {
    pub fn new(tts: Arc<dyn TtsClient>, retry: RetryPolicy) -> Self {
        Self { tts, retry }
    }

    /// One synthesis call (with retries), ignoring any cache.
    pub async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            return Err(anyhow!("Nothing to narrate"));
        }
        let tts = &self.tts;
        let audio = self
            .retry
            .execute("Speech synthesis", || async move {
                let audio = tts.synthesize(text, voice_id).await?;
                if audio.is_empty() {
                    return Err(anyhow::Error::from(UpstreamError::EmptyResponse {
                        service: "Speech synthesis",
                    }));
                }
                Ok(audio)
            })
            .await?;
        info!("Synthesized {} bytes with voice {}", audio.len(), voice_id);
        Ok(audio)
    }

    /// Cached audio for `voice` if present, otherwise synthesizes and stores it.
    pub async fn get_or_synthesize<'c>(
        &self,
        cache: &'c mut AssetCache,
        text: &str,
        voice: &Voice,
    ) -> Result<&'c VoiceAsset> {
        if cache.contains(&voice.id) {
            debug!("Using cached narration for {}", voice.name);
            return cache
                .get(&voice.id)
                .ok_or_else(|| anyhow!("Cached narration for {} vanished", voice.name));
        }
        self.regenerate(cache, text, voice).await
    }

    /// Synthesizes again and overwrites whatever the cache holds for `voice`.
    pub async fn regenerate<'c>(
        &self,
        cache: &'c mut AssetCache,
        text: &str,
        voice: &Voice,
    ) -> Result<&'c VoiceAsset> {
        let audio = self.synthesize(text, &voice.id).await?;
        Ok(cache.insert(VoiceAsset {
            voice_id: voice.id.clone(),
            voice_name: voice.name.clone(),
            audio,
        }))
    }
}
