//! Text-to-speech stage — streaming synthesis of reply text to PCM.

use async_trait::async_trait;
use tokio::sync::mpsc;

use voxflow_core::config::ServiceConfig;
use voxflow_core::error::Result;

pub mod chunker;
pub mod elevenlabs;
pub mod openai;

pub use chunker::SentenceChunker;
pub use elevenlabs::ElevenLabsTts;
pub use openai::OpenAiCompatTts;

/// A streaming text-to-speech backend.
///
/// Synthesized audio is raw 16-bit 16kHz mono PCM, delivered chunk by chunk
/// so playback can start before synthesis finishes. Engines stop early and
/// return Ok when the receiver is dropped (playback cancelled).
#[async_trait]
pub trait TtsEngine: Send + Sync {
    async fn stream(&self, text: &str, chunk_tx: mpsc::UnboundedSender<Vec<u8>>) -> Result<()>;
}

/// Build the configured engine. ElevenLabs when the provider says so,
/// otherwise the OpenAI-compatible speech endpoint (Groq PlayAI, OpenAI).
pub fn engine_from_config(cfg: &ServiceConfig) -> Box<dyn TtsEngine> {
    match cfg.provider.as_deref() {
        Some("elevenlabs") => Box::new(ElevenLabsTts::from_config(cfg)),
        _ => Box::new(OpenAiCompatTts::from_config(cfg)),
    }
}
