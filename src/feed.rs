//! Inbound message feed.
//!
//! The protocol client that authenticates against the source network and
//! fetches raw messages is an external collaborator. This module defines the
//! read-only message shape the engine requires and a JSON file loader that
//! stands in for that client.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One inbound message describing a job opportunity.
///
/// Immutable once ingested — the engine only ever reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Source (channel/group) identifier.
    pub source_id: String,
    /// Chat identifier within the source network.
    pub chat_id: i64,
    /// Message identifier within the chat.
    pub message_id: i64,
    /// When the message was posted.
    pub timestamp: DateTime<Utc>,
    /// Raw message text.
    pub text: String,
    /// Permalink back to the original post.
    pub permalink: String,
}

/// Load a message feed from a JSON file (an array of [`Message`]).
pub fn load_feed(path: &Path) -> Result<Vec<Message>, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let messages: Vec<Message> = serde_json::from_str(&raw)?;
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_feed_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{
                "source_id": "jobs_channel",
                "chat_id": 123,
                "message_id": 456,
                "timestamp": "2026-01-15T10:00:00Z",
                "text": "Python developer needed",
                "permalink": "https://t.me/jobs_channel/456"
            }}]"#
        )
        .unwrap();

        let messages = load_feed(file.path()).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].chat_id, 123);
        assert_eq!(messages[0].message_id, 456);
    }

    #[test]
    fn missing_feed_file_is_config_error() {
        let result = load_feed(Path::new("/nonexistent/feed.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
