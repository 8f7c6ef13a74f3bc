//! Dialogue session model — transcript entries and session metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for one live voice session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    pub id: String,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub language: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl SessionMeta {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            model: None,
            voice: None,
            language: None,
            started_at: Utc::now(),
        }
    }
}

impl Default for SessionMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// A single entry in the conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TranscriptEntry {
    #[serde(rename = "user")]
    User {
        text: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "assistant")]
    Assistant {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "system")]
    System {
        event: String,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// In-memory transcript for a session.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The last assistant text, if the most recent non-system entry is one.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.entries.iter().rev().find_map(|e| match e {
            TranscriptEntry::Assistant { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_append_order() {
        let mut t = Transcript::new();
        t.append(TranscriptEntry::User {
            text: "hello".into(),
            timestamp: Utc::now(),
        });
        t.append(TranscriptEntry::Assistant {
            text: "hi there".into(),
            usage: None,
            timestamp: Utc::now(),
        });
        assert_eq!(t.len(), 2);
        assert_eq!(t.last_assistant_text(), Some("hi there"));
    }

    #[test]
    fn test_transcript_entry_serde_tags() {
        let entry = TranscriptEntry::User {
            text: "hi".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "user");
    }

    #[test]
    fn test_session_meta_unique_ids() {
        let a = SessionMeta::new();
        let b = SessionMeta::new();
        assert_ne!(a.id, b.id);
    }
}
