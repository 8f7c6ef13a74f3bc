//! Dialogue session — drives one conversation through the voice pipeline.
//!
//! The session consumes turn events from the audio front-end, transcribes
//! completed turns, streams a language-model reply through the sentence
//! chunker into TTS, and emits a stream of [`SessionEvent`]s for the
//! transport to deliver. Barge-in cancels whatever is in flight.

use serde::{Deserialize, Serialize};

pub mod session;

pub use session::{DialogueSession, SessionHandle};

/// Events emitted by a running session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// The session task is up and the greeting is on its way.
    #[serde(rename = "ready")]
    Ready { session_id: String },

    /// Final transcript of a completed user turn.
    #[serde(rename = "user_transcript")]
    UserTranscript { text: String },

    /// Streaming assistant text delta.
    #[serde(rename = "reply_delta")]
    ReplyDelta { delta: String },

    /// The assistant reply finished (full text).
    #[serde(rename = "reply_done")]
    ReplyDone { text: String },

    /// Synthesized audio started flowing.
    #[serde(rename = "speaking_started")]
    SpeakingStarted,

    /// Synthesized audio stopped (finished or cancelled).
    #[serde(rename = "speaking_stopped")]
    SpeakingStopped,

    /// An in-flight reply was cancelled by barge-in.
    #[serde(rename = "interrupted")]
    Interrupted,

    /// A chunk of synthesized audio (raw PCM16 LE, 16 kHz mono).
    #[serde(rename = "audio_out")]
    AudioOut { pcm: Vec<u8> },

    /// Token usage for the last generation.
    #[serde(rename = "usage")]
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },

    /// A stage failed; the session keeps running.
    #[serde(rename = "error")]
    Error { kind: String, message: String },
}
