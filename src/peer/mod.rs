pub mod connection;
pub mod data_channel;
pub mod ice;
pub mod manager;
pub mod state;
pub mod types;

pub use connection::{PeerConnector, PeerHandle, RtcConnector};
pub use manager::{PeerEventReceiver, PeerManager};
pub use state::{PeerState, SessionId, DATA_CHANNEL_LABEL};
pub use types::{IceCandidate, PeerEvent, PeerEvents, SdpKind, ServerConfig, SessionDescription};
