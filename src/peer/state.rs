use std::fmt;

/// Label of the data channel opened by the sender.
pub const DATA_CHANNEL_LABEL: &str = "images";

/// Where the peer connection manager is in the life of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Nothing has been offered yet.
    Idle,
    /// Offer received, answer not yet sent or not yet connected.
    Negotiating,
    /// Transport is up, waiting for the sender's data channel.
    Connected,
    /// Frames are flowing.
    DataChannelOpen,
    /// Session torn down or abandoned; the next offer starts over.
    Closed,
}

impl PeerState {
    pub fn has_session(self) -> bool {
        matches!(
            self,
            PeerState::Negotiating | PeerState::Connected | PeerState::DataChannelOpen
        )
    }
}

/// Local identifier of one offer/answer session.
///
/// The relay protocol has no session id, so events coming back from the WebRTC
/// stack are tagged with this to tell live sessions from torn-down ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn next(self) -> SessionId {
        SessionId(self.0 + 1)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}
