//! Error types for the receiver.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the receiver.
///
/// Most of these never leave the runtime: the event loop turns them into status
/// reports and keeps waiting for the next offer.
#[derive(Debug, Error)]
pub enum Error {
    /// The configured relay address cannot be turned into a signaling endpoint.
    #[error("invalid signaling url: {0}")]
    InvalidUrl(String),

    /// Configuration failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// WebSocket failure on the control channel.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON could not be parsed or produced.
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    /// The WebRTC stack rejected an operation.
    #[error("webrtc error: {0}")]
    WebRtc(#[from] webrtc::Error),

    /// The relay did not complete the handshake in time.
    #[error("signaling dial timed out after {0:?}")]
    DialTimeout(std::time::Duration),

    /// Offer/answer exchange could not be completed.
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// A data-channel payload was not a usable frame.
    #[error("malformed frame: {0}")]
    Frame(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}
