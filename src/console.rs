//! Terminal rendering of history and node events.

use tokio::sync::mpsc;

use p2p_chat_node::common::{ChatMessage, DeliveryStatus, NodeEvent, time};

pub fn history_line(message: &ChatMessage) -> String {
    format!(
        "[{}] <{}> {}",
        time::short_time(&message.timestamp),
        message.author,
        message.content
    )
}

pub fn print_history(messages: &[ChatMessage]) {
    if messages.is_empty() {
        println!("\nNo previous chat history found.\n");
        return;
    }
    println!("\n--- Chat History ---");
    for message in messages {
        println!("{}", history_line(message));
    }
    println!("--- End of History ---\n");
}

pub fn sent_line(message: &ChatMessage) -> String {
    match message.status {
        DeliveryStatus::Delivered => format!("<You> {}", message.content),
        DeliveryStatus::Pending => format!("<You> {} (no peers connected, pending)", message.content),
    }
}

pub fn event_lines(event: &NodeEvent) -> Vec<String> {
    match event {
        NodeEvent::PeerConnected(addr) => vec![format!("[Connected: {addr}]")],
        NodeEvent::PeerDisconnected(addr) => vec![format!("[{addr} disconnected]")],
        NodeEvent::MessageReceived { message, .. } => {
            vec![format!("<{}> {}", message.author, message.content)]
        }
        NodeEvent::HistorySynced { messages, .. } => messages
            .iter()
            .map(|message| format!("[Missed] <{}> {}", message.author, message.content))
            .collect(),
    }
}

pub async fn print_events(mut events: mpsc::Receiver<NodeEvent>) {
    while let Some(event) = events.recv().await {
        for line in event_lines(&event) {
            println!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_uses_hour_and_minute() {
        let message = ChatMessage::sent("alice", "hi", "2024-06-01T09:07:33.000000Z".into());
        assert_eq!(history_line(&message), "[09:07] <alice> hi");
    }

    #[test]
    fn synced_batches_print_one_line_each() {
        let event = NodeEvent::HistorySynced {
            from: ([127, 0, 0, 1], 9000).into(),
            messages: vec![
                ChatMessage::sent("alice", "m1", "2024-06-01T09:00:00.000000Z".into()),
                ChatMessage::sent("alice", "m2", "2024-06-01T09:00:01.000000Z".into()),
            ],
        };
        assert_eq!(
            event_lines(&event),
            ["[Missed] <alice> m1", "[Missed] <alice> m2"]
        );
    }

    #[test]
    fn pending_sends_are_flagged() {
        let message = ChatMessage::sent("me", "later", "2024-06-01T09:00:00.000000Z".into())
            .with_status(DeliveryStatus::Pending);
        assert!(sent_line(&message).ends_with("pending)"));
    }
}
