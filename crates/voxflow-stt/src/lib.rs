//! Speech-to-text stage — turns a finalized turn's PCM into text.

use async_trait::async_trait;
use tracing::debug;

use voxflow_audio::pcm_to_wav;
use voxflow_core::config::ServiceConfig;
use voxflow_core::error::{Result, VoxflowError};
use voxflow_core::types::SAMPLE_RATE;

const GROQ_URL: &str = "https://api.groq.com/openai/v1/audio/transcriptions";
const OPENAI_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

/// A speech-to-text backend.
#[async_trait]
pub trait SttClient: Send + Sync {
    /// Transcribe 16-bit 16kHz mono PCM to text.
    async fn transcribe(&self, pcm: &[i16]) -> Result<String>;
}

/// STT over an OpenAI-compatible `/v1/audio/transcriptions` endpoint.
///
/// Groq hosts Whisper behind the same multipart API shape as OpenAI, so one
/// client covers both.
pub struct HttpSttClient {
    url: String,
    api_key: Option<String>,
    model: String,
    language: String,
    client: reqwest::Client,
}

impl HttpSttClient {
    pub fn from_config(cfg: &ServiceConfig) -> Self {
        let url = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| match cfg.provider.as_deref() {
                Some("openai") => OPENAI_URL.to_string(),
                _ => GROQ_URL.to_string(),
            });
        Self {
            url,
            api_key: cfg.resolve_api_key(),
            model: cfg
                .model
                .clone()
                .unwrap_or_else(|| "whisper-large-v3-turbo".to_string()),
            language: cfg.language.clone().unwrap_or_else(|| "en".to_string()),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SttClient for HttpSttClient {
    async fn transcribe(&self, pcm: &[i16]) -> Result<String> {
        if pcm.is_empty() {
            return Ok(String::new());
        }

        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| VoxflowError::Stt("No STT API key configured".into()))?;

        let wav_data = pcm_to_wav(pcm, SAMPLE_RATE, 1, 16);
        debug!(
            url = %self.url,
            model = %self.model,
            wav_bytes = wav_data.len(),
            "Sending audio for transcription"
        );

        let part = reqwest::multipart::Part::bytes(wav_data)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoxflowError::Stt(e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .text("language", self.language.clone())
            .text("response_format", "text")
            .part("file", part);

        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {api_key}"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| VoxflowError::Stt(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(VoxflowError::Stt(format!(
                "Transcription API error {status}: {body}"
            )));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| VoxflowError::Stt(e.to_string()))?;
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxflow_core::config::ServiceConfig;

    fn svc(provider: &str) -> ServiceConfig {
        ServiceConfig {
            provider: Some(provider.into()),
            ..ServiceConfig::default()
        }
    }

    #[test]
    fn test_provider_url_selection() {
        assert!(HttpSttClient::from_config(&svc("groq")).url().contains("groq.com"));
        assert!(HttpSttClient::from_config(&svc("openai")).url().contains("openai.com"));
        // Unknown providers fall back to Groq
        assert!(HttpSttClient::from_config(&svc("whatever")).url().contains("groq.com"));
    }

    #[test]
    fn test_base_url_override() {
        let cfg = ServiceConfig {
            base_url: Some("http://localhost:9999/stt".into()),
            ..ServiceConfig::default()
        };
        assert_eq!(HttpSttClient::from_config(&cfg).url(), "http://localhost:9999/stt");
    }

    #[tokio::test]
    async fn test_empty_pcm_short_circuits() {
        // No key configured — would error if it tried the network
        let client = HttpSttClient::from_config(&ServiceConfig::default());
        let text = client.transcribe(&[]).await.unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn test_missing_key_errors() {
        let client = HttpSttClient::from_config(&ServiceConfig::default());
        let err = client.transcribe(&[100i16; 320]).await.unwrap_err();
        assert!(err.to_string().contains("API key"));
    }
}
