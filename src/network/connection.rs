//! Per-connection tasks.
//!
//! Every live connection runs a reader task, which owns the right to read
//! from the socket and dispatches each line, and a writer task, which drains
//! the connection's outbound queue. Either side failing cancels the
//! connection's token; the reader then deregisters it and both halves of the
//! stream are dropped.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::broadcast::broadcast;
use super::node::NodeShared;
use super::protocol::{self, Frame, Inbound};
use super::registry::{ConnectionOrigin, PeerHandle};
use super::transport::{self, FrameReader, FrameWriter};
use crate::common::{ChatMessage, NodeEvent, time};
use crate::error::NodeError;

/// Register a freshly opened stream and start its tasks.
pub(crate) fn spawn_connection(
    shared: &Arc<NodeShared>,
    stream: TcpStream,
    remote: SocketAddr,
    origin: ConnectionOrigin,
) -> PeerHandle {
    let (reader, writer) = transport::framed(stream, shared.settings.max_frame_bytes);
    let (outbound_tx, outbound_rx) = mpsc::channel(shared.settings.outbound_queue.max(1));
    let closed = shared.shutdown.child_token();
    let peer = PeerHandle::new(remote, origin, outbound_tx, closed.clone());

    shared.registry.add(peer.clone());
    shared
        .tasks
        .spawn(write_loop(writer, outbound_rx, closed, remote));
    shared
        .tasks
        .spawn(read_loop(Arc::clone(shared), peer.clone(), reader));
    peer
}

async fn write_loop(
    mut writer: FrameWriter,
    mut outbound: mpsc::Receiver<String>,
    closed: CancellationToken,
    remote: SocketAddr,
) {
    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            line = outbound.recv() => {
                let Some(line) = line else { break };
                if let Err(err) = writer.send(line).await {
                    log::warn!("Write to {remote} failed: {err}");
                    closed.cancel();
                    break;
                }
            }
        }
    }
    if let Err(err) = SinkExt::<String>::close(&mut writer).await {
        log::debug!("Closing write half to {remote}: {err}");
    }
}

async fn read_loop(shared: Arc<NodeShared>, peer: PeerHandle, mut reader: FrameReader) {
    let remote = peer.remote_addr();
    shared.emit(NodeEvent::PeerConnected(remote)).await;

    if peer.origin() == ConnectionOrigin::Outbound {
        let request = shared.sync.request();
        log::info!(
            "Requesting history from {remote} since {}",
            shared.sync.checkpoint().timestamp()
        );
        if let Err(err) = send_frame(&peer, &request).await {
            log::warn!("Failed to send sync request to {remote}: {err}");
            peer.close();
        }
    }

    loop {
        let next = tokio::select! {
            _ = peer.closed_token().cancelled() => break,
            next = next_line(&mut reader, shared.settings.read_timeout) => next,
        };

        match next {
            Ok(Some(line)) => {
                if let Err(err) = handle_line(&shared, &peer, &line).await {
                    log::warn!("Closing connection to {remote}: {err}");
                    break;
                }
            }
            Ok(None) => {
                log::info!("{remote} disconnected");
                break;
            }
            Err(err) => {
                log::warn!("Read from {remote} failed: {err}");
                break;
            }
        }
    }

    shared.registry.remove(peer.id());
    peer.close();
    shared.emit(NodeEvent::PeerDisconnected(remote)).await;
}

async fn next_line(
    reader: &mut FrameReader,
    read_timeout: Option<Duration>,
) -> io::Result<Option<String>> {
    let next = match read_timeout {
        Some(limit) => tokio::time::timeout(limit, reader.next())
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "peer idle past read deadline"))?,
        None => reader.next().await,
    };
    match next {
        Some(Ok(line)) => Ok(Some(line)),
        Some(Err(err)) => Err(io::Error::new(io::ErrorKind::InvalidData, err)),
        None => Ok(None),
    }
}

async fn send_frame(peer: &PeerHandle, frame: &Frame) -> Result<(), NodeError> {
    let line = protocol::encode(frame)?;
    peer.send(line).await?;
    Ok(())
}

/// Dispatch one inbound line. Only a failed direct reply is fatal.
async fn handle_line(
    shared: &Arc<NodeShared>,
    peer: &PeerHandle,
    line: &str,
) -> Result<(), NodeError> {
    if line.trim().is_empty() {
        return Ok(());
    }
    let remote = peer.remote_addr();

    match protocol::decode(line) {
        Ok(Inbound::Frame(Frame::SyncRequest { last_timestamp })) => {
            match shared.sync.respond(&last_timestamp) {
                Ok(response) => {
                    if let Frame::SyncResponse { messages } = &response {
                        log::info!("Sending {} missed messages to {remote}", messages.len());
                    }
                    send_frame(peer, &response).await?;
                }
                Err(err) => log::warn!("Ignoring sync request from {remote}: {err}"),
            }
        }
        Ok(Inbound::Frame(Frame::SyncResponse { messages })) => {
            match shared.sync.merge(&messages) {
                Ok(merged) => {
                    log::info!(
                        "Merged {} of {} synced messages from {remote}",
                        merged.len(),
                        messages.len()
                    );
                    if !merged.is_empty() {
                        shared
                            .emit(NodeEvent::HistorySynced {
                                from: remote,
                                messages: merged,
                            })
                            .await;
                    }
                }
                Err(err) => log::warn!("Rejected sync response from {remote}: {err}"),
            }
        }
        Ok(Inbound::Frame(Frame::Chat {
            message,
            author,
            timestamp,
        })) => receive_chat(shared, peer, message, author, timestamp).await,
        Ok(Inbound::PlainText(text)) => receive_chat(shared, peer, text, None, None).await,
        Err(err) => log::warn!("Dropping frame from {remote}: {err}"),
    }
    Ok(())
}

/// Store a chat message from a peer and pass it on to every other peer.
///
/// Messages already in the log still count towards the checkpoint but are
/// neither re-announced nor relayed again, which is what stops a flood from
/// circulating in a cyclic mesh.
async fn receive_chat(
    shared: &Arc<NodeShared>,
    peer: &PeerHandle,
    content: String,
    author: Option<String>,
    timestamp: Option<String>,
) {
    let remote = peer.remote_addr();
    let author = author
        .filter(|author| !author.trim().is_empty())
        .unwrap_or_else(|| remote.to_string());
    let timestamp = timestamp
        .as_deref()
        .and_then(time::normalize)
        .unwrap_or_else(time::now);
    let message = ChatMessage::received(author, content, timestamp);

    let is_new = match shared.store.append(&message) {
        Ok(id) => id.is_some(),
        Err(err) => {
            log::error!("Failed to store message from {remote}: {err}");
            return;
        }
    };

    shared.sync.observe(&message.timestamp);

    if !is_new {
        log::debug!(
            "Already have message from {} at {}; not relaying",
            message.author,
            message.timestamp
        );
        return;
    }

    if let Err(err) = broadcast(&shared.registry, &Frame::chat(&message), Some(peer.id())) {
        log::error!("Failed to relay message from {remote}: {err}");
    }

    shared
        .emit(NodeEvent::MessageReceived {
            from: remote,
            message,
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PeerSendError;
    use crate::network::node::{ChatNode, NodeSettings};
    use crate::network::registry::tests::test_peer;
    use crate::storage::MessageStore;

    fn node() -> (ChatNode, mpsc::Receiver<NodeEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let store = Arc::new(MessageStore::in_memory().unwrap());
        (ChatNode::new("alice", store, NodeSettings::default(), tx), rx)
    }

    #[tokio::test]
    async fn failed_sync_reply_ends_the_connection() {
        let (node, _events) = node();
        let (peer, outbound) = test_peer(4100, 1);
        drop(outbound);

        let err = handle_line(
            node.shared(),
            &peer,
            r#"{"type":"sync_request","last_timestamp":"1970-01-01T00:00:00Z"}"#,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, NodeError::Send(PeerSendError::Closed)));

        // Chat from the same link is stored; only direct replies are fatal.
        assert!(handle_line(node.shared(), &peer, "still talking").await.is_ok());
        assert_eq!(node.store().message_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn known_chat_still_advances_the_checkpoint() {
        let (node, mut events) = node();
        let (peer, _outbound) = test_peer(4101, 4);
        let line = r#"{"type":"chat","message":"mine","author":"bob","timestamp":"2024-06-01T12:00:00Z"}"#;
        node.store()
            .append(&ChatMessage::sent(
                "bob",
                "mine",
                "2024-06-01T12:00:00.000000Z".into(),
            ))
            .unwrap();

        handle_line(node.shared(), &peer, line).await.unwrap();

        assert_eq!(node.checkpoint().timestamp(), "2024-06-01T12:00:00.000000Z");
        assert_eq!(node.store().message_count().unwrap(), 1);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn write_failure_cancels_the_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (server, remote) = listener.accept().await.unwrap();
        drop(client);

        let (_reader, writer) = transport::framed(server, 1024);
        let (tx, rx) = mpsc::channel(1);
        let closed = CancellationToken::new();
        let writer_task = tokio::spawn(write_loop(writer, rx, closed.clone(), remote));

        let fed = tokio::time::timeout(Duration::from_secs(5), async {
            while tx.send("ping".to_string()).await.is_ok() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(fed.is_ok(), "writer kept accepting lines after the peer left");
        assert!(closed.is_cancelled());
        writer_task.await.unwrap();
    }
}
