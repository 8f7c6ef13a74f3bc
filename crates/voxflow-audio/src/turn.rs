//! Turn controller — decides when a span of user speech forms one turn.

use std::collections::VecDeque;

use tracing::debug;

use voxflow_core::config::PipelineConfig;
use voxflow_core::types::{AudioFrame, CloseReason, Turn, FRAME_MS, SAMPLE_RATE};

use crate::vad::{VadTransition, VoiceActivityDetector};

/// Event emitted by the controller for a pushed frame.
#[derive(Debug)]
pub enum TurnEvent {
    /// Speech onset detected; a turn is now open. Arrives mid-assistant-speech,
    /// this is a barge-in.
    Started,
    /// A turn closed and is ready for transcription.
    Ended(Turn),
}

/// Consumes fixed-size frames and produces [`Turn`]s.
///
/// A pre-roll ring of recent frames is kept while idle so the onset of speech
/// (including the frames the VAD spent deciding) is not clipped from the turn.
pub struct TurnController {
    vad: VoiceActivityDetector,
    pre_roll: VecDeque<AudioFrame>,
    pre_roll_frames: usize,
    buffer: Vec<i16>,
    opened_at_ms: Option<u64>,
    max_turn_ms: u64,
}

impl TurnController {
    pub fn new(cfg: &PipelineConfig) -> Self {
        let hangover_frames = (cfg.close_silence_ms / FRAME_MS).max(1) as usize;
        Self {
            vad: VoiceActivityDetector::new(
                cfg.vad_threshold,
                cfg.min_voiced_frames,
                hangover_frames,
            ),
            pre_roll: VecDeque::new(),
            pre_roll_frames: (cfg.pre_roll_ms / FRAME_MS).max(1) as usize,
            buffer: Vec::new(),
            opened_at_ms: None,
            max_turn_ms: cfg.max_turn_ms,
        }
    }

    /// Feed one frame; returns a turn event when state changes.
    pub fn push_frame(&mut self, frame: AudioFrame) -> Option<TurnEvent> {
        let transition = self.vad.process_frame(&frame.pcm);

        match self.opened_at_ms {
            None => {
                self.pre_roll.push_back(frame);
                while self.pre_roll.len() > self.pre_roll_frames {
                    self.pre_roll.pop_front();
                }

                if transition == Some(VadTransition::SpeechStart) {
                    // Seed the buffer with the pre-roll so onset audio survives.
                    let first_ts = self.pre_roll.front().map(|f| f.timestamp_ms);
                    self.buffer.clear();
                    for f in self.pre_roll.drain(..) {
                        self.buffer.extend_from_slice(&f.pcm);
                    }
                    self.opened_at_ms = first_ts;
                    debug!(opened_at_ms = ?self.opened_at_ms, "Turn opened");
                    return Some(TurnEvent::Started);
                }
                None
            }
            Some(opened_at) => {
                let frame_end = frame.timestamp_ms + FRAME_MS;
                self.buffer.extend_from_slice(&frame.pcm);

                if transition == Some(VadTransition::SpeechEnd) {
                    debug!("Turn closed on silence");
                    return self.close(CloseReason::Silence).map(TurnEvent::Ended);
                }

                if frame_end.saturating_sub(opened_at) >= self.max_turn_ms {
                    debug!(duration_ms = frame_end - opened_at, "Turn closed on max length");
                    self.vad.reset();
                    return self.close(CloseReason::MaxLength).map(TurnEvent::Ended);
                }

                None
            }
        }
    }

    /// Force-close an open turn, e.g. when the transport is shutting down.
    pub fn flush(&mut self) -> Option<Turn> {
        self.vad.reset();
        self.close(CloseReason::Flushed)
    }

    /// Whether the user is currently inside an open turn.
    pub fn is_open(&self) -> bool {
        self.opened_at_ms.is_some()
    }

    fn close(&mut self, reason: CloseReason) -> Option<Turn> {
        self.opened_at_ms?;
        self.opened_at_ms = None;
        self.pre_roll.clear();

        if self.buffer.is_empty() {
            return None;
        }
        let pcm = std::mem::take(&mut self.buffer);
        let duration_ms = pcm.len() as u64 * 1000 / SAMPLE_RATE as u64;
        Some(Turn {
            pcm,
            duration_ms,
            close_reason: reason,
        })
    }
}
