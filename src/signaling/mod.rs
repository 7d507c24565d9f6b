//! Signaling transport: reconnecting control channel to the relay.

pub mod client;
pub mod link;
pub mod protocol;

pub use client::{Connection, Dialer, WireEvent, WsDialer};
pub use link::{LinkAction, LinkEvent, LinkState, SignalingLink};
pub use protocol::{EventKind, Inbound, Outbound, PeerSignal, Role, SignalingEnvelope};
