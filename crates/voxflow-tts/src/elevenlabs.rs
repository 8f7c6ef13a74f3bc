//! ElevenLabs streaming TTS client.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;

use voxflow_core::config::ServiceConfig;
use voxflow_core::error::{Result, VoxflowError};

use crate::TtsEngine;

const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";
const DEFAULT_VOICE: &str = "Rachel";
const DEFAULT_MODEL: &str = "eleven_turbo_v2";

pub struct ElevenLabsTts {
    base_url: String,
    api_key: Option<String>,
    voice: String,
    model: String,
    client: reqwest::Client,
}

impl ElevenLabsTts {
    pub fn from_config(cfg: &ServiceConfig) -> Self {
        Self {
            base_url: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| ELEVENLABS_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: cfg.resolve_api_key(),
            voice: cfg.voice.clone().unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            model: cfg.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            client: reqwest::Client::new(),
        }
    }

    /// Streaming synthesis URL for the configured voice.
    pub fn stream_url(&self) -> String {
        format!("{}/v1/text-to-speech/{}/stream", self.base_url, self.voice)
    }
}

#[async_trait]
impl TtsEngine for ElevenLabsTts {
    async fn stream(&self, text: &str, chunk_tx: mpsc::UnboundedSender<Vec<u8>>) -> Result<()> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| VoxflowError::Tts("No TTS API key configured".into()))?;

        debug!(voice = %self.voice, model = %self.model, text_len = text.len(), "Starting TTS stream");

        let resp = self
            .client
            .post(self.stream_url())
            .header("xi-api-key", &api_key)
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({
                "text": text,
                "model_id": self.model,
                "output_format": "pcm_16000",
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
