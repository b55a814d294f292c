use super::protocol::{self, Frame};
use super::registry::{ConnectionId, ConnectionRegistry};
use crate::error::FrameError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Send `frame` to every registered connection except `exclude`.
///
/// Works on a registry snapshot. A connection that cannot take the frame is
/// closed and deregistered; the remaining connections are still served.
pub fn broadcast(
    registry: &ConnectionRegistry,
    frame: &Frame,
    exclude: Option<ConnectionId>,
) -> Result<BroadcastReport, FrameError> {
    let line = protocol::encode(frame)?;
    let mut report = BroadcastReport::default();

    for peer in registry.snapshot() {
        if Some(peer.id()) == exclude {
            continue;
        }
        match peer.try_send(line.clone()) {
            Ok(()) => report.delivered += 1,
            Err(err) => {
                log::warn!("Dropping {} after failed send: {err}", peer.remote_addr());
                peer.close();
                registry.remove(peer.id());
                report.dropped += 1;
            }
        }
    }

    log::debug!(
        "Broadcast {} frame: {} delivered, {} dropped",
        frame.kind(),
        report.delivered,
        report.dropped
    );
    Ok(report)
}
