use crate::peer::connection::PeerHandle;
use crate::peer::state::SessionId;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// One offer/answer pairing and the connection it produced.
///
/// Owned exclusively by the peer manager; dropping out of the manager means
/// [`Session::close`] has run.
pub struct Session {
    pub id: SessionId,
    pub started_at: DateTime<Utc>,
    peer: Box<dyn PeerHandle>,
}

impl Session {
    pub fn new(id: SessionId, peer: Box<dyn PeerHandle>) -> Self {
        Self {
            id,
            started_at: Utc::now(),
            peer,
        }
    }

    pub fn peer(&self) -> &dyn PeerHandle {
        self.peer.as_ref()
    }

    /// Releases the data channel and connection; close errors are only logged.
    pub async fn close(self) {
        let lasted = Utc::now() - self.started_at;
        if let Err(e) = self.peer.close().await {
            debug!(session = %self.id, "error while closing peer connection: {e}");
        }
        info!(
            session = %self.id,
            seconds = lasted.num_seconds(),
            "session closed"
        );
    }
}
