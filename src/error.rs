use thiserror::Error;

/// Errors produced by the message store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Creating the database directory failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted row holds a value the domain types cannot represent.
    #[error("Invalid stored row: {0}")]
    InvalidRow(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A frame whose `type` is known but whose body does not match it.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("malformed `{kind}` frame: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("invalid timestamp `{0}`")]
    InvalidTimestamp(String),

    #[error("sync entry {index} has an empty author")]
    EmptyAuthor { index: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Queuing a frame on one connection failed.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PeerSendError {
    #[error("connection closed")]
    Closed,
    #[error("outbound queue full")]
    QueueFull,
}

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Send(#[from] PeerSendError),

    #[error("node is shutting down")]
    ShuttingDown,
}
