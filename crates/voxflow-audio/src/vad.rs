//! Energy-based Voice Activity Detection (VAD).

/// State transition reported by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadTransition {
    SpeechStart,
    SpeechEnd,
}

/// Voice Activity Detector using RMS energy on 16-bit PCM frames.
///
/// Opening requires `min_voiced_frames` consecutive voiced frames so a single
/// click does not start a turn; closing requires `hangover_frames` consecutive
/// silent frames so short pauses inside a sentence do not end one.
pub struct VoiceActivityDetector {
    /// RMS threshold for speech detection.
    threshold: f64,
    /// Consecutive voiced frames required to declare speech start.
    min_voiced_frames: usize,
    /// Consecutive silent frames required to declare speech end.
    hangover_frames: usize,
    /// Current state: true = speech active.
    speech_active: bool,
    voiced_count: usize,
    silent_count: usize,
    /// Slowly-adapting noise floor estimate, tracked while silent.
    noise_floor: f64,
}

impl VoiceActivityDetector {
    pub fn new(threshold: f64, min_voiced_frames: usize, hangover_frames: usize) -> Self {
        Self {
            threshold,
            min_voiced_frames,
            hangover_frames,
            speech_active: false,
            voiced_count: 0,
            silent_count: 0,
            noise_floor: 0.0,
        }
    }

    /// Defaults tuned for 16kHz 20ms frames: ~120ms to open, ~400ms to close.
    pub fn default_16khz() -> Self {
        Self::new(300.0, 6, 20)
    }

    /// Compute RMS energy of a PCM frame.
    pub fn rms(samples: &[i16]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / samples.len() as f64).sqrt()
    }

    /// Process a single audio frame, returning a transition if state changed.
    pub fn process_frame(&mut self, pcm: &[i16]) -> Option<VadTransition> {
        let energy = Self::rms(pcm);
        // Effective threshold rides above the ambient noise floor.
        let is_speech = energy > self.threshold.max(self.noise_floor * 2.0);

        if is_speech {
            self.silent_count = 0;
            if !self.speech_active {
                self.voiced_count += 1;
                if self.voiced_count >= self.min_voiced_frames {
                    self.speech_active = true;
                    self.voiced_count = 0;
                    return Some(VadTransition::SpeechStart);
                }
            }
        } else {
            self.voiced_count = 0;
            // Exponential moving average of silent-frame energy.
            self.noise_floor = self.noise_floor * 0.95 + energy * 0.05;
            if self.speech_active {
                self.silent_count += 1;
                if self.silent_count >= self.hangover_frames {
                    self.speech_active = false;
                    self.silent_count = 0;
                    return Some(VadTransition::SpeechEnd);
                }
            }
        }

        None
    }

    /// Whether speech is currently active.
    pub fn is_active(&self) -> bool {
        self.speech_active
    }

    /// Reset the detector state, keeping the learned noise floor.
    pub fn reset(&mut self) {
        self.speech_active = false;
        self.voiced_count = 0;
        self.silent_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: usize = 320;

    fn speech() -> Vec<i16> {
        vec![2000i16; FRAME]
    }

    fn silence() -> Vec<i16> {
        vec![0i16; FRAME]
    }

    #[test]
    fn test_rms_calculation() {
        assert_eq!(VoiceActivityDetector::rms(&silence()), 0.0);

        let signal = vec![100i16; FRAME];
        let rms = VoiceActivityDetector::rms(&signal);
        assert!((rms - 100.0).abs() < 0.01);

        assert_eq!(VoiceActivityDetector::rms(&[]), 0.0);
    }

    #[test]
    fn test_start_requires_consecutive_voiced_frames() {
        let mut vad = VoiceActivityDetector::new(50.0, 3, 5);

        assert_eq!(vad.process_frame(&speech()), None);
        assert_eq!(vad.process_frame(&speech()), None);
        // A silent frame in between resets the count
        assert_eq!(vad.process_frame(&silence()), None);
        assert_eq!(vad.process_frame(&speech()), None);
        assert_eq!(vad.process_frame(&speech()), None);
        assert_eq!(
            vad.process_frame(&speech()),
            Some(VadTransition::SpeechStart)
        );
        assert!(vad.is_active());
    }

    #[test]
    fn test_end_requires_hangover() {
        let mut vad = VoiceActivityDetector::new(50.0, 1, 3);
        assert_eq!(
            vad.process_frame(&speech()),
            Some(VadTransition::SpeechStart)
        );

        assert_eq!(vad.process_frame(&silence()), None);
        assert_eq!(vad.process_frame(&silence()), None);
        assert_eq!(vad.process_frame(&silence()), Some(VadTransition::SpeechEnd));
        assert!(!vad.is_active());
    }

    #[test]
    fn test_pause_resets_hangover() {
        let mut vad = VoiceActivityDetector::new(50.0, 1, 3);
        vad.process_frame(&speech());

        vad.process_frame(&silence());
        vad.process_frame(&silence());
        // Speech resumes before the hangover expires
        assert_eq!(vad.process_frame(&speech()), None);
        assert!(vad.is_active());
    }

    #[test]
    fn test_noise_floor_adapts_to_hum() {
        // Sustained hum below the static threshold trains the noise floor
        let mut vad = VoiceActivityDetector::new(200.0, 1, 3);
        let hum = vec![150i16; FRAME];
        for _ in 0..200 {
            assert_eq!(vad.process_frame(&hum), None);
        }
        // Floor has converged near 150, so the effective threshold is ~300
        // and a 250-level signal no longer counts as speech.
        let mid = vec![250i16; FRAME];
        assert_eq!(vad.process_frame(&mid), None);
        assert!(!vad.is_active());
        // Real speech still cuts through
        assert_eq!(
            vad.process_frame(&speech()),
            Some(VadTransition::SpeechStart)
        );
    }

    #[test]
    fn test_reset() {
        let mut vad = VoiceActivityDetector::new(50.0, 1, 3);
        vad.process_frame(&speech());
        assert!(vad.is_active());
        vad.reset();
        assert!(!vad.is_active());
    }
}
