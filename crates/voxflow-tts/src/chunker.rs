//! Sentence chunking for incremental synthesis.
//!
//! LLM deltas arrive a few tokens at a time; sending each one to the TTS
//! engine produces choppy audio, and waiting for the full reply adds latency.
//! The chunker slices the delta stream at sentence punctuation once a minimum
//! length is reached.

/// Splits an incremental text stream into synthesizable sentences.
pub struct SentenceChunker {
    pending: String,
    min_chars: usize,
}

impl SentenceChunker {
    pub fn new() -> Self {
        Self::with_min_chars(24)
    }

    pub fn with_min_chars(min_chars: usize) -> Self {
        Self {
            pending: String::new(),
            min_chars,
        }
    }

    /// Push a delta; returns every complete chunk it produced.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.pending.push_str(delta);
        let mut chunks = Vec::new();

        loop {
            let Some(split_at) = self.find_boundary() else {
                break;
            };
            let chunk: String = self.pending.drain(..split_at).collect();
            let trimmed = chunk.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }
        }

        chunks
    }

    /// Flush whatever remains once the stream is done.
    pub fn finish(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.pending);
        let trimmed = tail.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Byte index just past the first usable sentence boundary, if any.
    fn find_boundary(&self) -> Option<usize> {
        let mut candidate = None;
        for (i, c) in self.pending.char_indices() {
            if matches!(c, '.' | '!' | '?' | ';' | ':' | '\n') {
                let end = i + c.len_utf8();
                // Don't split "3.5" style decimals
                if c == '.' {
                    let next = self.pending[end..].chars().next();
                    if next.is_some_and(|n| n.is_ascii_digit()) {
                        continue;
                    }
                }
                if end >= self.min_chars {
                    candidate = Some(end);
                    break;
                }
            }
        }
        candidate
    }
}

impl Default for SentenceChunker {
    fn default() -> Self {
        Self::new()
    }
}
