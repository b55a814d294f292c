use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::broadcast::broadcast;
use super::connection::spawn_connection;
use super::protocol::{DEFAULT_MAX_FRAME_BYTES, Frame};
use super::registry::{ConnectionOrigin, ConnectionRegistry, PeerHandle};
use super::sync::{Checkpoint, SyncEngine};
use super::transport;
use crate::common::{ChatMessage, DeliveryStatus, NodeEvent, time};
use crate::error::NodeError;
use crate::storage::MessageStore;

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub connect_timeout: Duration,
    /// Close a connection that sends nothing for this long. `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Frames queued per connection before it counts as unresponsive.
    pub outbound_queue: usize,
    pub max_frame_bytes: usize,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: None,
            outbound_queue: 256,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// State shared by the listener, every connection task and the local sender.
pub(crate) struct NodeShared {
    pub(crate) username: String,
    pub(crate) store: Arc<MessageStore>,
    pub(crate) registry: ConnectionRegistry,
    pub(crate) sync: SyncEngine,
    pub(crate) settings: NodeSettings,
    pub(crate) shutdown: CancellationToken,
    pub(crate) tasks: TaskTracker,
    events: mpsc::Sender<NodeEvent>,
}

impl NodeShared {
    pub(crate) async fn emit(&self, event: NodeEvent) {
        if self.events.send(event).await.is_err() {
            log::debug!("Event receiver dropped; event discarded");
        }
    }
}

/// One chat peer: a listener, any number of direct connections and the
/// local message log.
#[derive(Clone)]
pub struct ChatNode {
    shared: Arc<NodeShared>,
}

impl ChatNode {
    pub fn new(
        username: impl Into<String>,
        store: Arc<MessageStore>,
        settings: NodeSettings,
        events: mpsc::Sender<NodeEvent>,
    ) -> Self {
        let sync = SyncEngine::new(Arc::clone(&store));
        Self {
            shared: Arc::new(NodeShared {
                username: username.into(),
                store,
                registry: ConnectionRegistry::new(),
                sync,
                settings,
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
                events,
            }),
        }
    }

    pub fn username(&self) -> &str {
        &self.shared.username
    }

    pub fn store(&self) -> &Arc<MessageStore> {
        &self.shared.store
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.shared.registry
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        self.shared.sync.checkpoint()
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<NodeShared> {
        &self.shared
    }

    pub fn peers(&self) -> Vec<SocketAddr> {
        let mut peers: Vec<_> = self
            .shared
            .registry
            .snapshot()
            .iter()
            .map(PeerHandle::remote_addr)
            .collect();
        peers.sort();
        peers
    }

    /// Bind `addr` and start accepting peers in the background.
    /// Returns the bound address.
    pub async fn listen<A: ToSocketAddrs>(&self, addr: A) -> Result<SocketAddr, NodeError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(NodeError::ShuttingDown);
        }
        let listener = transport::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        log::info!("Listening on {local_addr}");
        self.shared
            .tasks
            .spawn(accept_loop(Arc::clone(&self.shared), listener));
        Ok(local_addr)
    }

    /// Dial a peer, register the connection and ask it for missed history.
    pub async fn connect(&self, addr: &str) -> Result<PeerHandle, NodeError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(NodeError::ShuttingDown);
        }
        let stream = transport::dial(addr, self.shared.settings.connect_timeout).await?;
        let remote = stream.peer_addr()?;
        log::info!("Connected to peer at {remote}");
        Ok(spawn_connection(
            &self.shared,
            stream,
            remote,
            ConnectionOrigin::Outbound,
        ))
    }

    /// Log a locally authored message, then fan it out to every peer.
    ///
    /// Nothing is sent if the log write fails. With no peer connected the
    /// message is stored as pending and reaches peers through their next sync.
    pub fn send_chat(&self, content: &str) -> Result<ChatMessage, NodeError> {
        let status = if self.shared.registry.is_empty() {
            DeliveryStatus::Pending
        } else {
            DeliveryStatus::Delivered
        };
        let message =
            ChatMessage::sent(self.shared.username.as_str(), content, time::now()).with_status(status);
        self.shared.store.append(&message)?;

        let report = broadcast(&self.shared.registry, &Frame::chat(&message), None)?;
        if report.dropped > 0 {
            log::warn!("{} peers dropped while sending", report.dropped);
        }
        Ok(message)
    }

    /// Stop accepting, close every connection and wait for all tasks to end.
    pub async fn shutdown(&self) {
        self.shared.shutdown.cancel();
        let closed = self.shared.registry.close_all();
        self.shared.tasks.close();
        self.shared.tasks.wait().await;
        log::info!("Node stopped ({closed} connections closed)");
    }
}

async fn accept_loop(shared: Arc<NodeShared>, listener: TcpListener) {
    loop {
        tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    if let Err(err) = stream.set_nodelay(true) {
                        log::debug!("set_nodelay for {remote}: {err}");
                    }
                    log::info!("Connected by {remote}");
                    spawn_connection(&shared, stream, remote, ConnectionOrigin::Inbound);
                }
                Err(err) => {
                    log::warn!("Accept failed: {err}");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
    }
    log::info!("Listener stopped");
}
