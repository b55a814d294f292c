use std::net::SocketAddr;

use super::types::ChatMessage;

/// Events the network layer pushes up to the console.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    PeerConnected(SocketAddr),
    PeerDisconnected(SocketAddr),
    MessageReceived {
        from: SocketAddr,
        message: ChatMessage,
    },
    /// Messages newly merged from a peer's sync response, oldest first.
    HistorySynced {
        from: SocketAddr,
        messages: Vec<ChatMessage>,
    },
}
