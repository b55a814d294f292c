use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Whether a message was authored on this node or arrived from a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Sent => "sent",
            Direction::Received => "received",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Direction::Sent),
            "received" => Ok(Direction::Received),
            other => Err(format!("unknown direction `{other}`")),
        }
    }
}

/// `Pending` marks a local message written while no peer was connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Delivered,
    Pending,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Pending => "pending",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delivered" => Ok(DeliveryStatus::Delivered),
            "pending" => Ok(DeliveryStatus::Pending),
            other => Err(format!("unknown status `{other}`")),
        }
    }
}

/// One immutable entry of the chat log.
///
/// `timestamp` is always in canonical form (see [`crate::common::time`]), so
/// string comparison orders messages chronologically. The triple
/// `(author, timestamp, content)` identifies a message across peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub timestamp: String,
    pub author: String,
    pub direction: Direction,
    pub content: String,
    pub status: DeliveryStatus,
}

impl ChatMessage {
    pub fn sent(author: impl Into<String>, content: impl Into<String>, timestamp: String) -> Self {
        Self {
            timestamp,
            author: author.into(),
            direction: Direction::Sent,
            content: content.into(),
            status: DeliveryStatus::Delivered,
        }
    }

    pub fn received(
        author: impl Into<String>,
        content: impl Into<String>,
        timestamp: String,
    ) -> Self {
        Self {
            timestamp,
            author: author.into(),
            direction: Direction::Received,
            content: content.into(),
            status: DeliveryStatus::Delivered,
        }
    }

    pub fn with_status(mut self, status: DeliveryStatus) -> Self {
        self.status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_round_trips_through_its_column_text() {
        for direction in [Direction::Sent, Direction::Received] {
            assert_eq!(direction.as_str().parse::<Direction>(), Ok(direction));
        }
        assert!("relayed".parse::<Direction>().is_err());
    }
}
