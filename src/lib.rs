//! Receiving end of a boat camera link.
//!
//! A [`Receiver`] keeps a control channel to the signaling relay open, answers
//! the sender's WebRTC offer and hands every frame that arrives on the data
//! channel to a [`DisplaySurface`].

pub mod config;
pub mod error;
pub mod frame;
pub mod logger;
pub mod peer;
pub mod receiver;
pub mod session;
pub mod signaling;
pub mod status;
pub mod utils;

pub use config::ReceiverConfig;
pub use error::{Error, Result};
pub use frame::{DisplaySurface, FileSurface, FrameSink, LatestFrame};
pub use receiver::{Receiver, ReceiverBuilder, ReceiverHandle};
pub use status::{Snapshot, Status, StatusKind, StatusSink, StreamStatus};
