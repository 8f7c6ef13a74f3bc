//! Incremental SSE (Server-Sent Events) parser.
//!
//! HTTP chunk boundaries land anywhere, including mid-line, so the parser
//! buffers partial lines between pushes.

use futures::Stream;
use tokio_stream::StreamExt;

/// A parsed SSE event.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Line-buffering SSE parser, fed chunk by chunk.
#[derive(Default)]
pub struct SseParser {
    buffer: String,
    current_event: Option<String>,
    current_data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of body text; returns every event it completed.
    pub fn push(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(newline_pos) = self.buffer.find('\n') {
            let line = self.buffer[..newline_pos].trim_end_matches('\r').to_string();
            self.buffer.drain(..=newline_pos);

            if line.is_empty() {
                // Blank line dispatches the pending event
                if !self.current_data.is_empty() {
                    events.push(SseEvent {
                        event: self.current_event.take(),
                        data: self.current_data.join("\n"),
                    });
                    self.current_data.clear();
                }
                continue;
            }

            if line.starts_with(':') {
                continue; // comment
            }

            if let Some(value) = line.strip_prefix("event:") {
                self.current_event = Some(value.trim_start().to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                self.current_data.push(value.trim_start().to_string());
            }
            // Unknown fields (id, retry, ...) are ignored
        }

        events
    }

    /// Dispatch any trailing event once the stream has ended.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.current_data.is_empty() {
            return None;
        }
        let event = SseEvent {
            event: self.current_event.take(),
            data: self.current_data.join("\n"),
        };
        self.current_data.clear();
        Some(event)
    }
}

/// Parse a reqwest response body as a stream of SSE events.
pub fn parse_sse_stream(
    response: reqwest::Response,
) -> impl Stream<Item = anyhow::Result<SseEvent>> {
    struct State {
        bytes: std::pin::Pin<
            Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>,
        >,
        parser: SseParser,
        ready: std::collections::VecDeque<SseEvent>,
        done: bool,
    }

    let state = State {
        bytes: Box::pin(response.bytes_stream()),
        parser: SseParser::new(),
        ready: std::collections::VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.ready.pop_front() {
                return Some((Ok(event), state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let text = String::from_utf8_lossy(&chunk);
                    state.ready.extend(state.parser.push(&text));
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(anyhow::anyhow!("SSE stream error: {e}")), state));
                }
                None => {
                    state.done = true;
                    if let Some(event) = state.parser.finish() {
                        state.ready.push_back(event);
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut parser = SseParser::new();
        let events = parser.push("data: {\"x\":1}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"x\":1}");
        assert!(events[0].event.is_none());
    }

    #[test]
    fn test_event_with_name_and_multiline_data() {
        let mut parser = SseParser::new();
        let events = parser.push("event: delta\ndata: line1\ndata: line2\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("delta"));
        assert_eq!(events[0].data, "line1\nline2");
    }

    #[test]
    fn test_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.push("da").is_empty());
        assert!(parser.push("ta: hel").is_empty());
        let events = parser.push("lo\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn test_comments_and_crlf_ignored() {
        let mut parser = SseParser::new();
        let events = parser.push(": keepalive\r\ndata: x\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn test_finish_flushes_tail() {
        let mut parser = SseParser::new();
        assert!(parser.push("data: tail\n").is_empty());
        let tail = parser.finish().unwrap();
        assert_eq!(tail.data, "tail");
        assert!(parser.finish().is_none());
    }

    #[test]
    fn test_multiple_events_one_chunk() {
        let mut parser = SseParser::new();
        let events = parser.push("data: a\n\ndata: b\n\ndata: [DONE]\n\n");
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].data, "[DONE]");
    }
}
