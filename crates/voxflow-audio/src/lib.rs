//! Audio front-end — framing, VAD, and turn control.

pub mod frame;
pub mod turn;
pub mod vad;

pub use frame::{pcm_to_wav, FrameAssembler};
pub use turn::{TurnController, TurnEvent};
pub use vad::{VadTransition, VoiceActivityDetector};
