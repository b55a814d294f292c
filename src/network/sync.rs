//! History reconciliation.
//!
//! Right after dialing a peer the node sends its checkpoint in a
//! `sync_request`; the peer answers with every message it holds that is newer.
//! Merging that answer is a set union keyed on `(author, timestamp, content)`,
//! so replays and overlapping answers from several peers are harmless.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

use super::protocol::{Frame, SyncRecord};
use crate::common::{ChatMessage, DeliveryStatus, time};
use crate::error::SyncError;
use crate::storage::MessageStore;

/// The newest timestamp this node has received or merged.
///
/// Kept as microseconds since the epoch and only ever raised, so concurrent
/// handlers can advance it without a lock.
#[derive(Debug, Default)]
pub struct Checkpoint {
    micros: AtomicI64,
}

impl Checkpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the checkpoint to `at` if it is newer. Returns whether it moved.
    pub fn advance(&self, at: &DateTime<Utc>) -> bool {
        let candidate = at.timestamp_micros();
        self.micros.fetch_max(candidate, Ordering::AcqRel) < candidate
    }

    pub fn current(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(self.micros.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Canonical string form, as sent in `sync_request`.
    pub fn timestamp(&self) -> String {
        time::format(&self.current())
    }
}

pub struct SyncEngine {
    store: Arc<MessageStore>,
    checkpoint: Checkpoint,
}

impl SyncEngine {
    pub fn new(store: Arc<MessageStore>) -> Self {
        Self {
            store,
            checkpoint: Checkpoint::new(),
        }
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    /// The request a dialing node sends once the connection is up.
    pub fn request(&self) -> Frame {
        Frame::SyncRequest {
            last_timestamp: self.checkpoint.timestamp(),
        }
    }

    /// Answer a peer's request with everything strictly newer than its checkpoint.
    pub fn respond(&self, last_timestamp: &str) -> Result<Frame, SyncError> {
        let since = time::normalize(last_timestamp)
            .ok_or_else(|| SyncError::InvalidTimestamp(last_timestamp.to_string()))?;
        let messages = self
            .store
            .query_since(&since)?
            .iter()
            .map(SyncRecord::from)
            .collect();
        Ok(Frame::SyncResponse { messages })
    }

    /// Merge a peer's answer into the local log.
    ///
    /// The whole batch is validated before anything is written and then
    /// applied in one transaction. Authorship and direction are kept as the
    /// peer recorded them. Returns the messages that were new to this node.
    pub fn merge(&self, records: &[SyncRecord]) -> Result<Vec<ChatMessage>, SyncError> {
        let mut batch = Vec::with_capacity(records.len());
        let mut newest: Option<DateTime<Utc>> = None;

        for (index, record) in records.iter().enumerate() {
            let at = time::parse(record.timestamp())
                .ok_or_else(|| SyncError::InvalidTimestamp(record.timestamp().to_string()))?;
            if record.author().trim().is_empty() {
                return Err(SyncError::EmptyAuthor { index });
            }
            newest = newest.max(Some(at));
            batch.push(ChatMessage {
                timestamp: time::format(&at),
                author: record.author().to_string(),
                direction: record.direction(),
                content: record.content().to_string(),
                status: DeliveryStatus::Delivered,
            });
        }

        let inserted = self.store.append_batch(&batch)?;
        if let Some(newest) = newest {
            self.checkpoint.advance(&newest);
        }
        Ok(inserted)
    }

    /// Record that a live chat message with this timestamp was received.
    ///
    /// The sender's clock is not trusted past the arrival time, so a
    /// future-dated frame cannot push the checkpoint beyond history that
    /// peers have yet to send.
    pub fn observe(&self, timestamp: &str) {
        if let Some(at) = time::parse(timestamp) {
            self.checkpoint.advance(&at.min(Utc::now()));
        }
    }
}
