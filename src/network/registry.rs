use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::PeerSendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Which side opened the connection. Only outbound links start a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOrigin {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Active,
    Closed,
}

/// Sending side of one live connection.
///
/// Frames are queued to the connection's writer task; cancelling `closed`
/// tears the whole connection down. Cloning yields another handle to the
/// same connection.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    id: ConnectionId,
    remote_addr: SocketAddr,
    origin: ConnectionOrigin,
    outbound: mpsc::Sender<String>,
    closed: CancellationToken,
}

impl PeerHandle {
    pub fn new(
        remote_addr: SocketAddr,
        origin: ConnectionOrigin,
        outbound: mpsc::Sender<String>,
        closed: CancellationToken,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            remote_addr,
            origin,
            outbound,
            closed,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn origin(&self) -> ConnectionOrigin {
        self.origin
    }

    pub fn state(&self) -> ConnectionState {
        if self.closed.is_cancelled() || self.outbound.is_closed() {
            ConnectionState::Closed
        } else {
            ConnectionState::Active
        }
    }

    /// Queue a line without waiting; a full queue counts as a failure.
    pub fn try_send(&self, line: String) -> Result<(), PeerSendError> {
        if self.closed.is_cancelled() {
            return Err(PeerSendError::Closed);
        }
        self.outbound.try_send(line).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => PeerSendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => PeerSendError::Closed,
        })
    }

    /// Queue a line, waiting for space.
    pub async fn send(&self, line: String) -> Result<(), PeerSendError> {
        if self.closed.is_cancelled() {
            return Err(PeerSendError::Closed);
        }
        self.outbound
            .send(line)
            .await
            .map_err(|_| PeerSendError::Closed)
    }

    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn closed_token(&self) -> &CancellationToken {
        &self.closed
    }
}

/// The set of live connections.
///
/// Shared by the accept loop, the dialer, every connection handler and the
/// broadcast path. A connection is present at most once; removing an absent
/// id is a no-op.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    peers: Mutex<HashMap<ConnectionId, PeerHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, PeerHandle>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `false` if the connection was already registered.
    pub fn add(&self, peer: PeerHandle) -> bool {
        let mut peers = self.lock();
        if peers.contains_key(&peer.id()) {
            return false;
        }
        peers.insert(peer.id(), peer);
        true
    }

    pub fn remove(&self, id: ConnectionId) -> Option<PeerHandle> {
        self.lock().remove(&id)
    }

    /// Point-in-time copy; safe to iterate while others mutate the registry.
    pub fn snapshot(&self) -> Vec<PeerHandle> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Close and drop every registered connection.
    pub fn close_all(&self) -> usize {
        let drained: Vec<PeerHandle> = self.lock().drain().map(|(_, peer)| peer).collect();
        for peer in &drained {
            peer.close();
        }
        drained.len()
    }
}
