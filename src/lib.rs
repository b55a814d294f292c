//! Peer-to-peer chat node.
//!
//! Each node keeps direct TCP connections to its peers, an append-only SQLite
//! log of every message it has seen, and reconciles missed history with a peer
//! whenever it dials one.

pub mod common;
pub mod config;
pub mod error;
pub mod network;
pub mod storage;
