use serde::{Deserialize, Serialize};

/// Pipeline sample rate in Hz. All PCM inside the pipeline is 16 kHz mono.
pub const SAMPLE_RATE: u32 = 16_000;

/// Frame duration in milliseconds.
pub const FRAME_MS: u64 = 20;

/// Samples per frame (20 ms at 16 kHz).
pub const FRAME_SAMPLES: usize = (SAMPLE_RATE as u64 * FRAME_MS / 1000) as usize;

/// One fixed-duration audio frame flowing through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// 16-bit PCM samples, mono.
    pub pcm: Vec<i16>,
    /// Milliseconds since the start of the stream.
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn duration_ms(&self) -> u64 {
        self.pcm.len() as u64 * 1000 / SAMPLE_RATE as u64
    }
}

/// Convert little-endian PCM16 bytes to samples. Odd trailing bytes are dropped.
pub fn bytes_to_pcm(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

/// Convert PCM16 samples to little-endian bytes.
pub fn pcm_to_bytes(pcm: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(pcm.len() * 2);
    for &s in pcm {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}

/// Why a user turn was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Sustained silence after speech.
    Silence,
    /// The turn hit the maximum allowed length.
    MaxLength,
    /// The transport flushed the turn explicitly (e.g. connection closing).
    Flushed,
}

/// A completed user turn ready for transcription.
#[derive(Debug, Clone)]
pub struct Turn {
    /// 16-bit PCM at 16 kHz mono, including pre-roll audio.
    pub pcm: Vec<i16>,
    /// Duration in milliseconds.
    pub duration_ms: u64,
    pub close_reason: CloseReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_constants() {
        assert_eq!(FRAME_SAMPLES, 320);
    }

    #[test]
    fn test_pcm_byte_roundtrip() {
        let pcm = vec![0i16, 100, -100, i16::MAX, i16::MIN];
        let bytes = pcm_to_bytes(&pcm);
        assert_eq!(bytes_to_pcm(&bytes), pcm);
    }

    #[test]
    fn test_bytes_to_pcm_drops_odd_tail() {
        let bytes = vec![0x01, 0x02, 0x03];
        assert_eq!(bytes_to_pcm(&bytes).len(), 1);
    }

    #[test]
    fn test_frame_duration() {
        let frame = AudioFrame {
            pcm: vec![0; FRAME_SAMPLES],
            timestamp_ms: 0,
        };
        assert_eq!(frame.duration_ms(), 20);
    }
}
