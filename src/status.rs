//! Connection state reporting.
//!
//! Two things leave the receiver for outside consumption: human-readable status
//! lines (`{message, type}`) pushed to a [`StatusSink`], and a [`Snapshot`] that
//! anyone can watch for the coarse stream state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Severity of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Waiting,
    Info,
    Success,
    Error,
}

/// Status line as shown next to the video surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: StatusKind,
}

impl Status {
    pub fn new(message: impl Into<String>, kind: StatusKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    pub fn waiting(message: impl Into<String>) -> Self {
        Self::new(message, StatusKind::Waiting)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, StatusKind::Info)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(message, StatusKind::Success)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, StatusKind::Error)
    }
}

/// Coarse stream state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StreamStatus {
    #[default]
    Offline,
    Connecting,
    Live,
    Error,
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StreamStatus::Offline => "OFFLINE",
            StreamStatus::Connecting => "CONNECTING",
            StreamStatus::Live => "LIVE",
            StreamStatus::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// Read-only view of the receiver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub status: Status,
    pub stream: StreamStatus,
    pub signaling_connected: bool,
    pub frames_received: u64,
    pub last_frame_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn is_receiving(&self) -> bool {
        self.stream == StreamStatus::Live
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            status: Status::waiting("Connecting..."),
            stream: StreamStatus::Offline,
            signaling_connected: false,
            frames_received: 0,
            last_frame_at: None,
        }
    }
}

/// Receives every status line.
pub trait StatusSink: Send + Sync {
    fn report(&self, status: &Status);
}

/// Writes status lines to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn report(&self, status: &Status) {
        match status.kind {
            StatusKind::Error => warn!(kind = ?status.kind, "{}", status.message),
            _ => info!(kind = ?status.kind, "{}", status.message),
        }
    }
}

/// Shared handle every component reports through.
#[derive(Clone)]
pub struct Reporter {
    inner: Arc<Inner>,
}

struct Inner {
    sink: Arc<dyn StatusSink>,
    snapshot: watch::Sender<Snapshot>,
}

impl Reporter {
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        let (snapshot, _) = watch::channel(Snapshot::default());
        Self {
            inner: Arc::new(Inner { sink, snapshot }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn stream(&self) -> StreamStatus {
        self.inner.snapshot.borrow().stream
    }

    pub fn report(&self, status: Status) {
        self.inner.sink.report(&status);
        self.inner.snapshot.send_modify(|s| s.status = status);
    }

    pub fn set_stream(&self, stream: StreamStatus) {
        self.inner.snapshot.send_if_modified(|s| {
            let changed = s.stream != stream;
            s.stream = stream;
            changed
        });
    }

    pub fn set_signaling_connected(&self, connected: bool) {
        self.inner.snapshot.send_if_modified(|s| {
            let changed = s.signaling_connected != connected;
            s.signaling_connected = connected;
            changed
        });
    }

    pub fn frame_rendered(&self, at: DateTime<Utc>) {
        self.inner.snapshot.send_modify(|s| {
            s.frames_received += 1;
            s.last_frame_at = Some(at);
        });
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}
