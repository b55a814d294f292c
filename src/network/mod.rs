pub mod broadcast;
mod connection;
pub mod node;
pub mod protocol;
pub mod registry;
pub mod sync;
pub mod transport;

pub use broadcast::{BroadcastReport, broadcast};
pub use node::{ChatNode, NodeSettings};
pub use protocol::{Frame, Inbound, SyncRecord};
pub use registry::{ConnectionId, ConnectionOrigin, ConnectionRegistry, ConnectionState, PeerHandle};
pub use sync::{Checkpoint, SyncEngine};
