//! # News Avatar Signaling
//!
//! Signaling between the player and the avatar-video provider.
//! Holds the relay wire protocol, the retrying relay client used by the
//! player, and the credential-injecting relay server.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod protocol;
pub mod server;

// Re-export main types
pub use client::{HttpRelayClient, RelayClient};
pub use config::RelayConfig;
pub use protocol::{is_valid_stream_id, Ack, RelayOperation, StreamKey, StreamSession};
pub use server::{build_router, RelayServer, RelayState};
