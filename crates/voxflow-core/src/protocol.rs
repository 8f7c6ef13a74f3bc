//! WebSocket control protocol.
//!
//! Audio travels as binary frames (raw PCM16 LE, 16 kHz mono) in both
//! directions. Everything else is JSON text frames with a tagged `type`.

use serde::{Deserialize, Serialize};

/// Protocol version implemented by this server.
pub const PROTOCOL_VERSION: u32 = 1;

/// Client -> Server control frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Force-close the current turn (e.g. push-to-talk release).
    #[serde(rename = "flush")]
    Flush,

    /// Keepalive.
    #[serde(rename = "ping")]
    Ping,
}

/// Server -> Client control frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// Sent once after the session is started.
    #[serde(rename = "ready")]
    Ready {
        session_id: String,
        protocol: u32,
        version: String,
    },

    /// Final transcript of a completed user turn.
    #[serde(rename = "transcript")]
    Transcript { text: String },

    /// Incremental assistant reply text.
    #[serde(rename = "reply_delta")]
    ReplyDelta { delta: String },

    /// The full assistant reply for the turn.
    #[serde(rename = "reply_done")]
    ReplyDone { text: String },

    /// Assistant audio playback state changed.
    #[serde(rename = "speaking")]
    Speaking { active: bool },

    /// An in-flight reply was cancelled by barge-in.
    #[serde(rename = "interrupted")]
    Interrupted,

    /// Token usage for the last generation.
    #[serde(rename = "usage")]
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },

    /// An error occurred; the session stays open unless the socket closes.
    #[serde(rename = "error")]
    Error { kind: String, message: String },

    /// Keepalive response.
    #[serde(rename = "pong")]
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_tags() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"flush"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Flush));
    }

    #[test]
    fn test_server_frame_round_trip() {
        let frame = ServerFrame::ReplyDelta {
            delta: "hel".into(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"reply_delta""#));
        let back: ServerFrame = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, ServerFrame::ReplyDelta { delta } if delta == "hel"));
    }

    #[test]
    fn test_error_frame_shape() {
        let frame = ServerFrame::Error {
            kind: "stt".into(),
            message: "upstream 500".into(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["kind"], "stt");
    }
}
