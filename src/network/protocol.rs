//! Wire protocol.
//!
//! A connection carries newline-delimited JSON frames, each an object with a
//! `type` tag:
//!
//! ```json
//! {"type":"chat","message":"hi","author":"alice","timestamp":"2024-06-01T12:00:00.000000Z"}
//! {"type":"sync_request","last_timestamp":"1970-01-01T00:00:00.000000Z"}
//! {"type":"sync_response","messages":[["2024-06-01T12:00:00.000000Z","alice","sent","hi"]]}
//! ```
//!
//! Splitting the byte stream into lines ([`line_codec`]) and classifying a
//! line ([`decode`]) are separate steps.
//!
//! Lines that are not JSON, or JSON without a known `type`, are accepted as
//! plain-text chat. This keeps peers that write bare text working. A line
//! whose `type` *is* known but whose body is wrong is rejected instead, so a
//! damaged sync response can never be half-merged.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::codec::LinesCodec;

use crate::common::{ChatMessage, Direction};
use crate::error::FrameError;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Chat {
        message: String,
        /// Original author; absent on frames from bare-text peers.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        author: Option<String>,
        /// Original creation time; absent on frames from bare-text peers.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    SyncRequest {
        last_timestamp: String,
    },
    SyncResponse {
        messages: Vec<SyncRecord>,
    },
}

impl Frame {
    pub fn chat(message: &ChatMessage) -> Self {
        Frame::Chat {
            message: message.content.clone(),
            author: Some(message.author.clone()),
            timestamp: Some(message.timestamp.clone()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Chat { .. } => "chat",
            Frame::SyncRequest { .. } => "sync_request",
            Frame::SyncResponse { .. } => "sync_response",
        }
    }
}

/// One history entry inside a `sync_response`, sent as
/// `[timestamp, author, direction, content]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord(pub String, pub String, pub Direction, pub String);

impl SyncRecord {
    pub fn timestamp(&self) -> &str {
        &self.0
    }

    pub fn author(&self) -> &str {
        &self.1
    }

    pub fn direction(&self) -> Direction {
        self.2
    }

    pub fn content(&self) -> &str {
        &self.3
    }
}

impl From<&ChatMessage> for SyncRecord {
    fn from(message: &ChatMessage) -> Self {
        SyncRecord(
            message.timestamp.clone(),
            message.author.clone(),
            message.direction,
            message.content.clone(),
        )
    }
}

/// A classified inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Frame(Frame),
    PlainText(String),
}

pub fn line_codec(max_frame_bytes: usize) -> LinesCodec {
    LinesCodec::new_with_max_length(max_frame_bytes)
}

pub fn encode(frame: &Frame) -> Result<String, FrameError> {
    Ok(serde_json::to_string(frame)?)
}

pub fn decode(line: &str) -> Result<Inbound, FrameError> {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(_) => return Ok(Inbound::PlainText(line.to_string())),
    };

    let kind = match value.get("type").and_then(Value::as_str) {
        Some("chat") => "chat",
        Some("sync_request") => "sync_request",
        Some("sync_response") => "sync_response",
        _ => return Ok(Inbound::PlainText(line.to_string())),
    };

    serde_json::from_value(value)
        .map(Inbound::Frame)
        .map_err(|source| FrameError::Malformed { kind, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_response_uses_row_arrays() {
        let frame = Frame::SyncResponse {
            messages: vec![SyncRecord(
                "2024-06-01T12:00:00.000000Z".into(),
                "alice".into(),
                Direction::Sent,
                "hi".into(),
            )],
        };
        let line = encode(&frame).unwrap();
        assert_eq!(
            line,
            r#"{"type":"sync_response","messages":[["2024-06-01T12:00:00.000000Z","alice","sent","hi"]]}"#
        );
        assert_eq!(decode(&line).unwrap(), Inbound::Frame(frame));
    }

    #[test]
    fn chat_without_author_still_decodes() {
        let decoded = decode(r#"{"type":"chat","message":"yo"}"#).unwrap();
        assert_eq!(
            decoded,
            Inbound::Frame(Frame::Chat {
                message: "yo".into(),
                author: None,
                timestamp: None,
            })
        );
    }

    #[test]
    fn non_json_and_untyped_json_fall_back_to_plain_text() {
        assert_eq!(
            decode("just words").unwrap(),
            Inbound::PlainText("just words".into())
        );
        assert_eq!(
            decode(r#"{"hello":1}"#).unwrap(),
            Inbound::PlainText(r#"{"hello":1}"#.into())
        );
        assert_eq!(decode("42").unwrap(), Inbound::PlainText("42".into()));
    }

    #[test]
    fn malformed_sync_response_is_rejected() {
        let bad_direction =
            r#"{"type":"sync_response","messages":[["2024-06-01T12:00:00Z","a","forwarded","x"]]}"#;
        let short_row = r#"{"type":"sync_response","messages":[["2024-06-01T12:00:00Z","a"]]}"#;
        for line in [bad_direction, short_row] {
            match decode(line) {
                Err(FrameError::Malformed { kind, .. }) => assert_eq!(kind, "sync_response"),
                other => panic!("expected malformed frame, got {other:?}"),
            }
        }
    }

    #[test]
    fn sync_request_requires_timestamp() {
        assert!(matches!(
            decode(r#"{"type":"sync_request"}"#),
            Err(FrameError::Malformed {
                kind: "sync_request",
                ..
            })
        ));
    }
}
