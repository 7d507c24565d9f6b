//! In-memory relay and scripted WebRTC stack for driving a receiver end to end.

#![allow(dead_code)]

use async_trait::async_trait;
use boatview::error::{Error, Result};
use boatview::peer::{
    IceCandidate, PeerConnector, PeerEvent, PeerEvents, PeerHandle, SessionDescription,
};
use boatview::signaling::{Connection, Dialer, WireEvent};
use boatview::{LatestFrame, ReceiverBuilder, ReceiverConfig, ReceiverHandle, Status, StatusSink};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

/// The relay's end of one control channel.
pub struct RelaySide {
    pub url: Url,
    from_receiver: mpsc::UnboundedReceiver<String>,
    to_receiver: mpsc::UnboundedSender<WireEvent>,
}

impl RelaySide {
    pub fn send(&self, text: impl Into<String>) {
        let _ = self.to_receiver.send(WireEvent::Text(text.into()));
    }

    pub fn send_json(&self, value: Value) {
        self.send(value.to_string());
    }

    pub fn error(&self, reason: &str) {
        let _ = self.to_receiver.send(WireEvent::Error(reason.to_string()));
    }

    pub fn close(self) {
        let _ = self.to_receiver.send(WireEvent::Closed);
    }

    /// Next message from the receiver, parsed. `None` once the receiver hung up.
    pub async fn recv(&mut self) -> Option<Value> {
        let text = self.from_receiver.recv().await?;
        Some(serde_json::from_str(&text).expect("receiver sent invalid json"))
    }

    pub fn try_recv(&mut self) -> Option<Value> {
        let text = self.from_receiver.try_recv().ok()?;
        Some(serde_json::from_str(&text).expect("receiver sent invalid json"))
    }
}

/// Dialer that hands every new control channel to the test.
pub struct FakeRelay {
    accepted: mpsc::UnboundedSender<RelaySide>,
    refuse: AtomicUsize,
    stall: AtomicUsize,
    dials: AtomicUsize,
}

impl FakeRelay {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RelaySide>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let relay = Arc::new(Self {
            accepted,
            refuse: AtomicUsize::new(0),
            stall: AtomicUsize::new(0),
            dials: AtomicUsize::new(0),
        });
        (relay, rx)
    }

    /// Makes the next `n` dials fail.
    pub fn refuse_next(&self, n: usize) {
        self.refuse.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` dials hang, like a relay that accepts TCP and never
    /// answers the upgrade.
    pub fn stall_next(&self, n: usize) {
        self.stall.store(n, Ordering::SeqCst);
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dialer for FakeRelay {
    async fn dial(&self, url: &Url) -> Result<Connection> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.refuse) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "relay unavailable",
            )));
        }

        if take_one(&self.stall) {
            std::future::pending::<()>().await;
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let _ = self.accepted.send(RelaySide {
            url: url.clone(),
            from_receiver: out_rx,
            to_receiver: in_tx,
        });
        Ok(Connection::new(out_tx, in_rx))
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// One scripted peer connection.
pub struct ScriptedPeer {
    pub events: PeerEvents,
    pub remote_candidates: Mutex<Vec<IceCandidate>>,
    pub closes: AtomicUsize,
}

impl ScriptedPeer {
    pub fn emit(&self, event: PeerEvent) {
        self.events.emit(event);
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn remote_candidates(&self) -> Vec<IceCandidate> {
        self.remote_candidates.lock().unwrap().clone()
    }
}

struct ScriptedHandle(Arc<ScriptedPeer>);

#[async_trait]
impl PeerHandle for ScriptedHandle {
    /// Answers `answer:<offer sdp>`; an offer whose sdp is `garbage` is rejected.
    async fn accept_offer(&self, offer: SessionDescription) -> Result<SessionDescription> {
        if offer.sdp == "garbage" {
            return Err(Error::Negotiation("could not parse remote sdp".into()));
        }
        Ok(SessionDescription::answer(format!("answer:{}", offer.sdp)))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.0.remote_candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector that keeps every peer it opens so tests can fire its callbacks.
#[derive(Default)]
pub struct ScriptedConnector {
    peers: Mutex<Vec<Arc<ScriptedPeer>>>,
}

impl ScriptedConnector {
    pub fn peer(&self, index: usize) -> Arc<ScriptedPeer> {
        self.peers.lock().unwrap()[index].clone()
    }

    pub fn opened(&self) -> usize {
        self.peers.lock().unwrap().len()
    }
}

#[async_trait]
impl PeerConnector for ScriptedConnector {
    async fn open(&self, events: PeerEvents) -> Result<Box<dyn PeerHandle>> {
        let peer = Arc::new(ScriptedPeer {
            events,
            remote_candidates: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        });
        self.peers.lock().unwrap().push(peer.clone());
        Ok(Box::new(ScriptedHandle(peer)))
    }
}

/// Records every status line.
#[derive(Default)]
pub struct StatusLog(Mutex<Vec<Status>>);

impl StatusSink for StatusLog {
    fn report(&self, status: &Status) {
        self.0.lock().unwrap().push(status.clone());
    }
}

impl StatusLog {
    pub fn all(&self) -> Vec<Status> {
        self.0.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.all().into_iter().map(|s| s.message).collect()
    }

    pub fn contains(&self, message: &str) -> bool {
        self.messages().iter().any(|m| m == message)
    }
}

pub struct Harness {
    pub receiver: ReceiverHandle,
    pub relay: Arc<FakeRelay>,
    pub relays: mpsc::UnboundedReceiver<RelaySide>,
    pub connector: Arc<ScriptedConnector>,
    pub surface: Arc<LatestFrame>,
    pub log: Arc<StatusLog>,
}

impl Harness {
    pub fn start() -> Self {
        Self::start_with(ReceiverConfig::default().with_base_url("http://relay.test:8000"))
    }

    pub fn start_with(config: ReceiverConfig) -> Self {
        let (relay, relays) = FakeRelay::new();
        let connector = Arc::new(ScriptedConnector::default());
        let surface = Arc::new(LatestFrame::new());
        let log = Arc::new(StatusLog::default());

        let receiver = ReceiverBuilder::new(config)
            .dialer(relay.clone())
            .connector(connector.clone())
            .surface(surface.clone())
            .status_sink(log.clone())
            .spawn()
            .expect("valid config");

        Self {
            receiver,
            relay,
            relays,
            connector,
            surface,
            log,
        }
    }

    /// Waits for the receiver to dial and consumes its `identify`.
    pub async fn accept(&mut self) -> RelaySide {
        let mut side = self.relays.recv().await.expect("receiver dialed");
        let identify = side.recv().await.expect("identify sent");
        assert_eq!(identify["event"], "identify");
        assert_eq!(identify["data"]["type"], "receiver");
        side
    }
}

/// Lets the receiver task drain everything that is ready.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
