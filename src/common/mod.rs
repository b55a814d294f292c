pub mod commands;
pub mod events;
pub mod time;
pub mod types;

pub use commands::ConsoleCommand;
pub use events::NodeEvent;
pub use types::{ChatMessage, DeliveryStatus, Direction};
