use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::core::config::resolve_api_key;
use crate::core::error::{http_error, UpstreamError};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranscriptionConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_language")]
    pub language: String,
    pub base_url: Option<String>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            api_key: None,
            model: default_model(),
            language: default_language(),
            base_url: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}
fn default_model() -> String {
    "whisper-1".to_string()
}
fn default_language() -> String {
    "en".to_string()
}

#[async_trait]
pub trait Transcriber: Send + Sync + Debug {
    /// Text spoken in a WAV recording.
    async fn transcribe(&self, wav: &[u8]) -> Result<String>;
}

/// `None` when voice input is disabled or no OpenAI key is available.
pub fn create_transcriber(config: &TranscriptionConfig) -> Option<Box<dyn Transcriber>> {
    if !config.enabled {
        return None;
    }
    let Some(api_key) = resolve_api_key(config.api_key.as_deref(), "OPENAI_API_KEY") else {
        info!("No OpenAI API key found; voice input is disabled");
        return None;
    };
    Some(Box::new(WhisperClient {
        api_key,
        model: config.model.clone(),
        language: config.language.clone(),
        base_url: config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/')
            .to_string(),
        client: reqwest::Client::new(),
    }))
}

#[derive(Debug)]
struct WhisperClient {
    api_key: String,
    model: String,
    language: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        let url = format!("{}/audio/transcriptions", self.base_url);

        let part = multipart::Part::bytes(wav.to_vec())
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .context("Invalid mime type")?;
        let form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("language", self.language.clone())
            .part("file", part);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(http_error("Whisper", resp).await);
        }

        let result: WhisperResponse = resp.json().await?;
        let text = result.text.trim().to_string();
        if text.is_empty() {
            return Err(UpstreamError::EmptyResponse { service: "Whisper" }.into());
        }
        Ok(text)
    }
}
