//! Fixed-size frame assembly from arbitrary transport chunks.

use voxflow_core::types::{AudioFrame, FRAME_MS, FRAME_SAMPLES};

/// Accumulates raw PCM16 bytes and emits complete fixed-duration frames.
///
/// Transports deliver audio in whatever chunk sizes they like; the pipeline
/// downstream only ever sees 20 ms frames. An odd trailing byte is held back
/// until the next chunk completes the sample.
pub struct FrameAssembler {
    pending_byte: Option<u8>,
    samples: Vec<i16>,
    timestamp_ms: u64,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            pending_byte: None,
            samples: Vec::with_capacity(FRAME_SAMPLES * 2),
            timestamp_ms: 0,
        }
    }

    /// Push transport bytes; returns every complete frame they produced.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<AudioFrame> {
        let mut buf;
        let bytes = match self.pending_byte.take() {
            Some(b) => {
                buf = Vec::with_capacity(bytes.len() + 1);
                buf.push(b);
                buf.extend_from_slice(bytes);
                &buf[..]
            }
            None => bytes,
        };

        if bytes.len() % 2 == 1 {
            self.pending_byte = Some(bytes[bytes.len() - 1]);
        }

        for chunk in bytes.chunks_exact(2) {
            self.samples.push(i16::from_le_bytes([chunk[0], chunk[1]]));
        }

        let mut frames = Vec::new();
        while self.samples.len() >= FRAME_SAMPLES {
            let pcm: Vec<i16> = self.samples.drain(..FRAME_SAMPLES).collect();
            frames.push(AudioFrame {
                pcm,
                timestamp_ms: self.timestamp_ms,
            });
            self.timestamp_ms += FRAME_MS;
        }
        frames
    }

    /// Samples buffered but not yet forming a complete frame.
    pub fn pending_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn reset(&mut self) {
        self.pending_byte = None;
        self.samples.clear();
        self.timestamp_ms = 0;
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap raw 16-bit PCM in a WAV container.
pub fn pcm_to_wav(pcm: &[i16], sample_rate: u32, channels: u16, bits_per_sample: u16) -> Vec<u8> {
    let data_len = pcm.len() * 2; // 2 bytes per i16 sample
    let byte_rate = sample_rate * channels as u32 * bits_per_sample as u32 / 8;
    let block_align = channels * bits_per_sample / 8;
    let file_size = 36 + data_len as u32;

    let mut wav = Vec::with_capacity(44 + data_len);

    // RIFF header
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&file_size.to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    // fmt chunk
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(data_len as u32).to_le_bytes());
    for &sample in pcm {
        wav.extend_from_slice(&sample.to_le_bytes());
    }

    wav
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxflow_core::types::pcm_to_bytes;

    #[test]
    fn test_emits_fixed_frames() {
        let mut asm = FrameAssembler::new();
        let samples = vec![7i16; FRAME_SAMPLES * 2 + 100];
        let frames = asm.push(&pcm_to_bytes(&samples));
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.pcm.len() == FRAME_SAMPLES));
        assert_eq!(asm.pending_samples(), 100);
    }

    #[test]
    fn test_timestamps_advance() {
        let mut asm = FrameAssembler::new();
        let samples = vec![0i16; FRAME_SAMPLES * 3];
        let frames = asm.push(&pcm_to_bytes(&samples));
        assert_eq!(frames[0].timestamp_ms, 0);
        assert_eq!(frames[1].timestamp_ms, 20);
        assert_eq!(frames[2].timestamp_ms, 40);
    }

    #[test]
    fn test_odd_byte_carries_over() {
        let mut asm = FrameAssembler::new();
        let samples: Vec<i16> = (0..FRAME_SAMPLES as i16).collect();
        let bytes = pcm_to_bytes(&samples);

        // Split mid-sample
        let frames1 = asm.push(&bytes[..101]);
        assert!(frames1.is_empty());
        let frames2 = asm.push(&bytes[101..]);
        assert_eq!(frames2.len(), 1);
        assert_eq!(frames2[0].pcm, samples);
    }

    #[test]
    fn test_wav_header_generation() {
        let pcm = vec![0i16; 16000]; // 1 second at 16kHz
        let wav = pcm_to_wav(&pcm, 16000, 1, 16);

        // WAV header is 44 bytes
        assert_eq!(wav.len(), 44 + 16000 * 2);

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");

        // Check sample rate (bytes 24-27)
        let sr = u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]);
        assert_eq!(sr, 16000);
    }
}
