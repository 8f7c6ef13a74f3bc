//! OpenAI-compatible `/v1/audio/speech` TTS client.
//!
//! Covers OpenAI's own speech endpoint and Groq's hosted PlayAI voices,
//! which serve the same request shape.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;

use voxflow_core::config::ServiceConfig;
use voxflow_core::error::{Result, VoxflowError};

use crate::TtsEngine;

const GROQ_BASE_URL: &str = "https://api.groq.com/openai";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiCompatTts {
    base_url: String,
    api_key: Option<String>,
    voice: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatTts {
    pub fn from_config(cfg: &ServiceConfig) -> Self {
        let base = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| match cfg.provider.as_deref() {
                Some("openai") => OPENAI_BASE_URL.to_string(),
                _ => GROQ_BASE_URL.to_string(),
            });
        Self {
            base_url: base.trim_end_matches('/').to_string(),
            api_key: cfg.resolve_api_key(),
            voice: cfg.voice.clone().unwrap_or_else(|| "Fritz-PlayAI".to_string()),
            model: cfg.model.clone().unwrap_or_else(|| "playai-tts".to_string()),
            client: reqwest::Client::new(),
        }
    }

    pub fn speech_url(&self) -> String {
        format!("{}/v1/audio/speech", self.base_url)
    }
}

#[async_trait]
impl TtsEngine for OpenAiCompatTts {
    async fn stream(&self, text: &str, chunk_tx: mpsc::UnboundedSender<Vec<u8>>) -> Result<()> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| VoxflowError::Tts("No TTS API key configured".into()))?;

        debug!(voice = %self.voice, model = %self.model, text_len = text.len(), "Starting TTS stream");

        let resp = self
            .client
            .post(self.speech_url())
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({
                "model": self.model,
                "voice": self.voice,
                "input": text,
                "response_format": "pcm",
            }))
            .send()
            .await
            .map_err(|e| VoxflowError::Tts(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(VoxflowError::Tts(format!("TTS API error {status}: {body}")));
        }

        let mut stream = resp.bytes_stream();
        while let Some(chunk_result) = stream.next().await {
            match chunk_result {
                Ok(bytes) => {
                    if chunk_tx.send(bytes.to_vec()).is_err() {
                        debug!("TTS chunk receiver dropped, stopping stream");
                        break;
                    }
                }
                Err(e) => {
                    return Err(VoxflowError::Tts(format!("TTS stream error: {e}")));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speech_url_by_provider() {
        let groq = OpenAiCompatTts::from_config(&ServiceConfig {
            provider: Some("groq".into()),
            ..ServiceConfig::default()
        });
        assert!(groq.speech_url().contains("groq.com"));

        let openai = OpenAiCompatTts::from_config(&ServiceConfig {
            provider: Some("openai".into()),
            ..ServiceConfig::default()
        });
        assert!(openai.speech_url().contains("openai.com"));
    }

    #[tokio::test]
    async fn test_missing_key_errors() {
        let tts = OpenAiCompatTts::from_config(&ServiceConfig::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = tts.stream("hello", tx).await.unwrap_err();
        assert!(err.to_string().contains("API key"));
    }
}
