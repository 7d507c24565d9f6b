//! Peer connection manager.
//!
//! Turns relay-delivered offers into a live data channel and folds everything the
//! WebRTC stack reports into [`PeerState`] and the stream status. At most one
//! [`Session`] exists at a time; an offer that arrives while one is live replaces
//! it. Methods return the message to send back through the relay, if any, and
//! leave sending to the caller.

use crate::error::Error;
use crate::frame::FrameSink;
use crate::peer::connection::PeerConnector;
use crate::peer::state::{PeerState, SessionId};
use crate::peer::types::{IceCandidate, PeerEvent, PeerEvents, SessionDescription};
use crate::session::Session;
use crate::signaling::Outbound;
use crate::status::{Reporter, Status, StreamStatus};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

pub type PeerEventReceiver = mpsc::UnboundedReceiver<(SessionId, PeerEvent)>;

pub struct PeerManager {
    connector: Arc<dyn PeerConnector>,
    frames: FrameSink,
    reporter: Reporter,
    state: PeerState,
    session: Option<Session>,
    last_session: SessionId,
    events: mpsc::UnboundedSender<(SessionId, PeerEvent)>,
}

impl PeerManager {
    /// The returned receiver yields every event of every session; feed it back
    /// through [`PeerManager::on_peer_event`].
    pub fn new(
        connector: Arc<dyn PeerConnector>,
        frames: FrameSink,
        reporter: Reporter,
    ) -> (Self, PeerEventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        let manager = Self {
            connector,
            frames,
            reporter,
            state: PeerState::Idle,
            session: None,
            last_session: SessionId(0),
            events,
        };
        (manager, rx)
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Negotiates a new session from `offer` and returns the answer to send.
    pub async fn on_offer(&mut self, offer: SessionDescription) -> Option<Outbound> {
        if let Some(live) = self.current_session() {
            warn!(session = %live, "new offer while a session is live, replacing it");
            self.teardown().await;
        }

        self.reporter
            .report(Status::info("Received offer - setting up connection..."));
        self.reporter.set_stream(StreamStatus::Connecting);
        self.state = PeerState::Negotiating;

        let id = self.last_session.next();
        self.last_session = id;

        let peer = match self
            .connector
            .open(PeerEvents::new(id, self.events.clone()))
            .await
        {
            Ok(peer) => peer,
            Err(e) => {
                self.abandon(e).await;
                return None;
            }
        };
        let session = self.session.insert(Session::new(id, peer));
        let answer = session.peer().accept_offer(offer).await;

        match answer {
            Ok(answer) => {
                debug!(session = %id, "answer created");
                self.reporter
                    .report(Status::info("Answer sent - establishing connection..."));
                Some(Outbound::Answer(answer))
            }
            Err(e) => {
                self.abandon(e).await;
                None
            }
        }
    }

    /// Applies a remote candidate, or drops it when there is no connection yet.
    pub async fn on_remote_candidate(&self, candidate: IceCandidate) {
        let Some(session) = self.session.as_ref() else {
            debug!("no peer connection, dropping remote ICE candidate");
            return;
        };
        if let Err(e) = session.peer().add_ice_candidate(candidate).await {
            warn!(session = %session.id, "error adding ICE candidate: {e}");
        }
    }

    pub async fn on_peer_disconnected(&mut self) {
        self.reporter.report(Status::error("Sender disconnected"));
        self.teardown().await;
    }

    /// Handles one event from the WebRTC stack. Events of sessions that are no
    /// longer current are ignored.
    pub async fn on_peer_event(
        &mut self,
        session: SessionId,
        event: PeerEvent,
    ) -> Option<Outbound> {
        if self.current_session() != Some(session) {
            trace!(%session, ?event, "event from stale session");
            return None;
        }

        match event {
            PeerEvent::LocalCandidate(candidate) => {
                return Some(Outbound::IceCandidate(candidate));
            }
            PeerEvent::ConnectionState(RTCPeerConnectionState::Connected) => {
                if self.state == PeerState::Negotiating {
                    self.state = PeerState::Connected;
                    self.reporter.report(Status::success(
                        "WebRTC Connected - waiting for data channel...",
                    ));
                }
            }
            PeerEvent::ConnectionState(
                RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Failed,
            ) => {
                self.reporter.report(Status::error("Connection lost"));
                self.teardown().await;
            }
            PeerEvent::ConnectionState(state) => {
                debug!(%session, "connection state {state}");
            }
            PeerEvent::DataChannelOpen => {
                self.state = PeerState::DataChannelOpen;
                self.reporter
                    .report(Status::success("Data channel open - receiving images!"));
                self.reporter.set_stream(StreamStatus::Live);
            }
            PeerEvent::DataChannelMessage(data) => {
                self.frames.render(&data);
            }
            PeerEvent::DataChannelClosed => {
                self.reporter.report(Status::error("Data channel closed"));
                self.teardown().await;
            }
        }
        None
    }

    /// Closes whatever is open and goes back to waiting for an offer.
    /// Running it again is harmless.
    pub async fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
        self.state = PeerState::Closed;
        self.reporter.set_stream(StreamStatus::Offline);
        self.reporter
            .report(Status::waiting("Waiting for new connection..."));
    }

    /// Negotiation failed: drop the session and wait for a fresh offer.
    async fn abandon(&mut self, e: Error) {
        error!("error handling offer: {e}");
        if let Some(session) = self.session.take() {
            session.close().await;
        }
        self.state = PeerState::Closed;
        self.reporter.set_stream(StreamStatus::Error);
        self.reporter.report(Status::error(format!("Error: {e}")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::frame::LatestFrame;
    use crate::peer::connection::PeerHandle;
    use crate::status::{StatusKind, StatusSink};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakePeer {
        closes: AtomicUsize,
        candidates: Mutex<Vec<IceCandidate>>,
    }

    struct Handle(Arc<FakePeer>, bool);

    #[async_trait]
    impl PeerHandle for Handle {
        async fn accept_offer(&self, offer: SessionDescription) -> Result<SessionDescription> {
            if self.1 {
                return Err(Error::Negotiation("incompatible offer".into()));
            }
            Ok(SessionDescription::answer(format!("answer to {}", offer.sdp)))
        }

        async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
            self.0.candidates.lock().unwrap().push(candidate);
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            self.0.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeConnector {
        peers: Mutex<Vec<Arc<FakePeer>>>,
        fail_accept: AtomicBool,
    }

    impl FakeConnector {
        fn peer(&self, index: usize) -> Arc<FakePeer> {
            self.peers.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl PeerConnector for FakeConnector {
        async fn open(&self, _events: PeerEvents) -> Result<Box<dyn PeerHandle>> {
            let peer = Arc::new(FakePeer::default());
            self.peers.lock().unwrap().push(peer.clone());
            Ok(Box::new(Handle(
                peer,
                self.fail_accept.load(Ordering::SeqCst),
            )))
        }
    }

    #[derive(Default)]
    struct Lines(Mutex<Vec<Status>>);

    impl StatusSink for Lines {
        fn report(&self, status: &Status) {
            self.0.lock().unwrap().push(status.clone());
        }
    }

    impl Lines {
        fn messages(&self) -> Vec<String> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .map(|s| s.message.clone())
                .collect()
        }

        fn kinds(&self) -> Vec<StatusKind> {
            self.0.lock().unwrap().iter().map(|s| s.kind).collect()
        }
    }

    struct Fixture {
        manager: PeerManager,
        connector: Arc<FakeConnector>,
        lines: Arc<Lines>,
        surface: Arc<LatestFrame>,
        reporter: Reporter,
    }

    fn fixture() -> Fixture {
        let connector = Arc::new(FakeConnector::default());
        let lines = Arc::new(Lines::default());
        let reporter = Reporter::new(lines.clone());
        let surface = Arc::new(LatestFrame::new());
        let frames = FrameSink::new(surface.clone(), reporter.clone());
        let (manager, _rx) = PeerManager::new(connector.clone(), frames, reporter.clone());
        Fixture {
            manager,
            connector,
            lines,
            surface,
            reporter,
        }
    }

    fn candidate(n: u32) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{n} 1 udp 2122260223 10.0.0.{n} 5000 typ host"),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }
    }

    #[tokio::test]
    async fn offer_produces_exactly_the_local_answer() {
        let mut f = fixture();

        let sent = f.manager.on_offer(SessionDescription::offer("v=0 offer")).await;

        assert_eq!(
            sent,
            Some(Outbound::Answer(SessionDescription::answer(
                "answer to v=0 offer"
            )))
        );
        assert_eq!(f.manager.state(), PeerState::Negotiating);
        assert!(f.manager.state().has_session());
        assert_eq!(f.reporter.stream(), StreamStatus::Connecting);
        assert_eq!(
            f.lines.messages(),
            vec![
                "Received offer - setting up connection...",
                "Answer sent - establishing connection...",
            ]
        );
    }

    #[tokio::test]
    async fn status_progresses_to_live_when_channel_opens() {
        let mut f = fixture();
        f.manager.on_offer(SessionDescription::offer("v=0")).await;
        let id = f.manager.current_session().unwrap();

        f.manager
            .on_peer_event(id, PeerEvent::ConnectionState(RTCPeerConnectionState::Connected))
            .await;
        assert_eq!(f.manager.state(), PeerState::Connected);

        f.manager.on_peer_event(id, PeerEvent::DataChannelOpen).await;
        assert_eq!(f.manager.state(), PeerState::DataChannelOpen);
        assert_eq!(f.reporter.stream(), StreamStatus::Live);
        assert_eq!(
            f.lines.kinds(),
            vec![
                StatusKind::Info,
                StatusKind::Info,
                StatusKind::Success,
                StatusKind::Success
            ]
        );
    }

    #[tokio::test]
    async fn local_candidates_are_forwarded() {
        let mut f = fixture();
        f.manager.on_offer(SessionDescription::offer("v=0")).await;
        let id = f.manager.current_session().unwrap();

        assert_eq!(
            f.manager
                .on_peer_event(id, PeerEvent::LocalCandidate(candidate(1)))
                .await,
            Some(Outbound::IceCandidate(candidate(1)))
        );
    }

    #[tokio::test]
    async fn candidates_without_connection_are_dropped() {
        let mut f = fixture();
        f.manager.on_remote_candidate(candidate(1)).await;
        assert!(f.connector.peers.lock().unwrap().is_empty());

        f.manager.on_offer(SessionDescription::offer("v=0")).await;
        f.manager.on_remote_candidate(candidate(2)).await;

        assert_eq!(
            *f.connector.peer(0).candidates.lock().unwrap(),
            vec![candidate(2)]
        );
    }

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let mut f = fixture();
        f.manager.on_offer(SessionDescription::offer("v=0")).await;
        let id = f.manager.current_session().unwrap();
        f.manager.on_peer_event(id, PeerEvent::DataChannelOpen).await;

        f.manager.on_peer_event(id, PeerEvent::DataChannelClosed).await;
        f.manager
            .on_peer_event(id, PeerEvent::ConnectionState(RTCPeerConnectionState::Failed))
            .await;
        f.manager.teardown().await;

        assert_eq!(f.connector.peer(0).closes.load(Ordering::SeqCst), 1);
        assert_eq!(f.manager.state(), PeerState::Closed);
        assert!(!f.manager.state().has_session());
        assert_eq!(f.manager.current_session(), None);
        assert_eq!(f.reporter.stream(), StreamStatus::Offline);
    }

    #[tokio::test]
    async fn connection_failure_tears_down() {
        let mut f = fixture();
        f.manager.on_offer(SessionDescription::offer("v=0")).await;
        let id = f.manager.current_session().unwrap();
        f.manager.on_peer_event(id, PeerEvent::DataChannelOpen).await;

        f.manager
            .on_peer_event(
                id,
                PeerEvent::ConnectionState(RTCPeerConnectionState::Disconnected),
            )
            .await;

        assert_eq!(f.manager.state(), PeerState::Closed);
        assert_eq!(f.reporter.stream(), StreamStatus::Offline);
        let messages = f.lines.messages();
        assert!(messages.ends_with(&[
            "Connection lost".to_string(),
            "Waiting for new connection...".to_string()
        ]));
    }

    #[tokio::test]
    async fn peer_disconnected_then_fresh_offer() {
        let mut f = fixture();
        f.manager.on_offer(SessionDescription::offer("first")).await;
        let first = f.manager.current_session().unwrap();
        f.manager.on_peer_event(first, PeerEvent::DataChannelOpen).await;

        f.manager.on_peer_disconnected().await;
        assert!(f.lines.messages().contains(&"Sender disconnected".to_string()));
        assert_eq!(f.reporter.stream(), StreamStatus::Offline);

        let answer = f.manager.on_offer(SessionDescription::offer("second")).await;
        let second = f.manager.current_session().unwrap();
        assert_ne!(first, second);
        assert_eq!(
            answer,
            Some(Outbound::Answer(SessionDescription::answer("answer to second")))
        );

        // late events of the old session change nothing
        f.manager.on_peer_event(first, PeerEvent::DataChannelClosed).await;
        f.manager
            .on_peer_event(first, PeerEvent::LocalCandidate(candidate(9)))
            .await;
        assert_eq!(f.manager.current_session(), Some(second));
        assert_eq!(f.manager.state(), PeerState::Negotiating);
        assert_eq!(f.connector.peer(1).closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn second_offer_supersedes_live_session() {
        let mut f = fixture();
        f.manager.on_offer(SessionDescription::offer("first")).await;
        let first = f.manager.current_session().unwrap();
        f.manager.on_peer_event(first, PeerEvent::DataChannelOpen).await;

        f.manager.on_offer(SessionDescription::offer("second")).await;

        assert_eq!(f.connector.peer(0).closes.load(Ordering::SeqCst), 1);
        assert_ne!(f.manager.current_session(), Some(first));
        assert_eq!(f.manager.state(), PeerState::Negotiating);
        assert_eq!(f.reporter.stream(), StreamStatus::Connecting);
    }

    #[tokio::test]
    async fn failed_negotiation_abandons_session() {
        let mut f = fixture();
        f.connector.fail_accept.store(true, Ordering::SeqCst);

        let sent = f.manager.on_offer(SessionDescription::offer("v=0")).await;

        assert_eq!(sent, None);
        assert_eq!(f.manager.state(), PeerState::Closed);
        assert_eq!(f.manager.current_session(), None);
        assert_eq!(f.connector.peer(0).closes.load(Ordering::SeqCst), 1);
        assert_eq!(f.reporter.stream(), StreamStatus::Error);
        let last = f.lines.0.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.kind, StatusKind::Error);
        assert!(last.message.starts_with("Error: negotiation failed"));

        f.connector.fail_accept.store(false, Ordering::SeqCst);
        assert!(f
            .manager
            .on_offer(SessionDescription::offer("v=0"))
            .await
            .is_some());
        assert_eq!(f.reporter.stream(), StreamStatus::Connecting);
    }

    #[tokio::test]
    async fn data_channel_frames_reach_the_surface() {
        let mut f = fixture();
        f.manager.on_offer(SessionDescription::offer("v=0")).await;
        let id = f.manager.current_session().unwrap();
        f.manager.on_peer_event(id, PeerEvent::DataChannelOpen).await;

        f.manager
            .on_peer_event(
                id,
                PeerEvent::DataChannelMessage(Bytes::from_static(
                    br#"{"base64":"data:image/jpeg;base64,AAAA"}"#,
                )),
            )
            .await;
        f.manager
            .on_peer_event(id, PeerEvent::DataChannelMessage(Bytes::from_static(b"{oops")))
            .await;

        assert_eq!(
            f.surface.source().as_deref(),
            Some("data:image/jpeg;base64,AAAA")
        );
        assert!(!f.surface.placeholder_visible());
        assert_eq!(f.manager.state(), PeerState::DataChannelOpen);
    }
}
