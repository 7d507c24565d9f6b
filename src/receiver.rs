//! Receiver runtime.
//!
//! One task owns the signaling link, the live control channel, the reconnect
//! timer and the peer manager. Socket readers and WebRTC callbacks only post
//! into channels this task drains, so nothing here is shared or locked.

use crate::config::ReceiverConfig;
use crate::error::{Error, Result};
use crate::frame::{DisplaySurface, FileSurface, FrameSink, LatestFrame};
use crate::peer::connection::{PeerConnector, RtcConnector};
use crate::peer::manager::{PeerEventReceiver, PeerManager};
use crate::peer::state::SessionId;
use crate::peer::types::PeerEvent;
use crate::signaling::{
    Connection, Dialer, LinkAction, LinkEvent, Outbound, PeerSignal, SignalingLink, WireEvent,
    WsDialer,
};
use crate::status::{Reporter, Snapshot, StatusSink, TracingSink};
use futures::future::BoxFuture;
use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use std::time::Duration;
use tokio::time::{sleep, timeout, Sleep};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug)]
enum Command {
    Shutdown(oneshot::Sender<()>),
}

/// Assembles a [`Receiver`]. Anything not supplied falls back to the real
/// WebSocket dialer, webrtc-rs, logged status lines and, unless the config
/// names an output file, an in-memory surface.
pub struct ReceiverBuilder {
    config: ReceiverConfig,
    dialer: Option<Arc<dyn Dialer>>,
    connector: Option<Arc<dyn PeerConnector>>,
    surface: Option<Arc<dyn DisplaySurface>>,
    status_sink: Option<Arc<dyn StatusSink>>,
}

impl ReceiverBuilder {
    pub fn new(config: ReceiverConfig) -> Self {
        Self {
            config,
            dialer: None,
            connector: None,
            surface: None,
            status_sink: None,
        }
    }

    pub fn dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = Some(dialer);
        self
    }

    pub fn connector(mut self, connector: Arc<dyn PeerConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn surface(mut self, surface: Arc<dyn DisplaySurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status_sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<Receiver> {
        self.config.validate()?;
        let url = self.config.signaling_url()?;

        let dialer = self.dialer.unwrap_or_else(|| Arc::new(WsDialer));
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(RtcConnector::new(self.config.ice_servers.clone())));
        let surface: Arc<dyn DisplaySurface> = match (self.surface, &self.config.frame_output) {
            (Some(surface), _) => surface,
            (None, Some(path)) => Arc::new(FileSurface::spawn(path.clone())),
            (None, None) => Arc::new(LatestFrame::new()),
        };
        let reporter = Reporter::new(self.status_sink.unwrap_or_else(|| Arc::new(TracingSink)));

        let frames = FrameSink::new(surface, reporter.clone());
        let (peers, peer_events) = PeerManager::new(connector, frames, reporter.clone());

        Ok(Receiver {
            url,
            dialer,
            link: SignalingLink::new(self.config.reconnect_delay()),
            dial_timeout: self.config.dial_timeout(),
            connection: None,
            dialing: None,
            reconnect: None,
            peers,
            peer_events,
            reporter,
        })
    }

    /// Builds the receiver and starts it on the current runtime.
    pub fn spawn(self) -> Result<ReceiverHandle> {
        Ok(self.build()?.spawn())
    }
}

/// The event loop. Use [`ReceiverBuilder`] to make one.
pub struct Receiver {
    url: Url,
    dialer: Arc<dyn Dialer>,
    link: SignalingLink,
    dial_timeout: Duration,
    connection: Option<Connection>,
    dialing: Option<BoxFuture<'static, Result<Connection>>>,
    reconnect: Option<Pin<Box<Sleep>>>,
    peers: PeerManager,
    peer_events: PeerEventReceiver,
    reporter: Reporter,
}

enum Next {
    Dialed(Result<Connection>),
    Wire(WireEvent),
    ReconnectDue,
    Peer(SessionId, PeerEvent),
    Shutdown(Option<oneshot::Sender<()>>),
}

impl Receiver {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn spawn(self) -> ReceiverHandle {
        let (commands, rx) = mpsc::channel(4);
        let status = self.reporter.subscribe();
        let task = tokio::spawn(self.run(rx));
        ReceiverHandle {
            commands,
            status,
            task,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!(url = %self.url, "receiver started");
        let actions = self.link.handle(LinkEvent::Start);
        self.apply(actions).await;

        loop {
            let next = tokio::select! {
                dialed = wait_dial(&mut self.dialing) => Next::Dialed(dialed),
                event = next_wire(&mut self.connection) => Next::Wire(event),
                () = wait_reconnect(&mut self.reconnect) => Next::ReconnectDue,
                Some((session, event)) = self.peer_events.recv() => Next::Peer(session, event),
                command = commands.recv() => match command {
                    Some(Command::Shutdown(done)) => Next::Shutdown(Some(done)),
                    None => Next::Shutdown(None),
                },
            };

            match next {
                Next::Dialed(Ok(connection)) => {
                    self.connection = Some(connection);
                    self.reporter.set_signaling_connected(true);
                    self.on_link(LinkEvent::Opened).await;
                }
                Next::Dialed(Err(e)) => {
                    self.on_link(LinkEvent::Error(e.to_string())).await;
                    self.on_link(LinkEvent::Closed).await;
                }
                Next::Wire(WireEvent::Text(text)) => {
                    debug!("received signaling message: {text}");
                    self.on_link(LinkEvent::Message(text)).await;
                }
                Next::Wire(WireEvent::Error(reason)) => {
                    self.on_link(LinkEvent::Error(reason)).await;
                }
                Next::Wire(WireEvent::Closed) => {
                    self.connection = None;
                    self.reporter.set_signaling_connected(false);
                    self.on_link(LinkEvent::Closed).await;
                }
                Next::ReconnectDue => self.on_link(LinkEvent::ReconnectDue).await,
                Next::Peer(session, event) => {
                    if let Some(message) = self.peers.on_peer_event(session, event).await {
                        self.send(message);
                    }
                }
                Next::Shutdown(done) => {
                    self.shutdown().await;
                    if let Some(done) = done {
                        let _ = done.send(());
                    }
                    break;
                }
            }
        }
        info!("receiver stopped");
    }

    async fn on_link(&mut self, event: LinkEvent) {
        let actions = self.link.handle(event);
        self.apply(actions).await;
    }

    async fn apply(&mut self, actions: Vec<LinkAction>) {
        for action in actions {
            match action {
                LinkAction::Dial => {
                    let dialer = self.dialer.clone();
                    let url = self.url.clone();
                    let limit = self.dial_timeout;
                    self.dialing = Some(Box::pin(async move {
                        match timeout(limit, dialer.dial(&url)).await {
                            Ok(dialed) => dialed,
                            Err(_) => Err(Error::DialTimeout(limit)),
                        }
                    }));
                }
                LinkAction::Send(message) => self.transmit(&message),
                LinkAction::Report(status) => self.reporter.report(status),
                LinkAction::ScheduleReconnect(delay) => {
                    self.reconnect = Some(Box::pin(sleep(delay)));
                }
                LinkAction::CancelReconnect => self.reconnect = None,
                LinkAction::Close => {
                    self.dialing = None;
                    self.connection = None;
                    self.reporter.set_signaling_connected(false);
                }
                LinkAction::Deliver(signal) => self.deliver(signal).await,
            }
        }
    }

    async fn deliver(&mut self, signal: PeerSignal) {
        match signal {
            PeerSignal::Offer(offer) => {
                if let Some(answer) = self.peers.on_offer(offer).await {
                    self.send(answer);
                }
            }
            PeerSignal::IceCandidate(candidate) => {
                self.peers.on_remote_candidate(candidate).await
            }
            PeerSignal::PeerDisconnected => self.peers.on_peer_disconnected().await,
        }
    }

    /// Sends through the link guard: dropped unless the link is open.
    fn send(&self, message: Outbound) {
        if let Some(LinkAction::Send(message)) = self.link.send(message) {
            self.transmit(&message);
        }
    }

    fn transmit(&self, message: &Outbound) {
        match &self.connection {
            Some(connection) => connection.send(message),
            None => warn!(event = ?message.event(), "no control channel, message dropped"),
        }
    }

    async fn shutdown(&mut self) {
        info!("receiver shutting down");
        self.on_link(LinkEvent::Teardown).await;
        self.dialing = None;
        self.reconnect = None;
        self.connection = None;
        self.peers.teardown().await;
        self.reporter.set_signaling_connected(false);
    }
}

async fn wait_dial(
    dialing: &mut Option<BoxFuture<'static, Result<Connection>>>,
) -> Result<Connection> {
    let Some(dial) = dialing.as_mut() else {
        return pending().await;
    };
    let result = dial.await;
    *dialing = None;
    result
}

async fn next_wire(connection: &mut Option<Connection>) -> WireEvent {
    match connection.as_mut() {
        Some(connection) => connection.next_event().await,
        None => pending().await,
    }
}

async fn wait_reconnect(timer: &mut Option<Pin<Box<Sleep>>>) {
    let Some(delay) = timer.as_mut() else {
        return pending().await;
    };
    delay.as_mut().await;
    *timer = None;
}

/// Control handle for a spawned receiver.
pub struct ReceiverHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<Snapshot>,
    task: JoinHandle<()>,
}

impl ReceiverHandle {
    /// Current snapshot of the receiver.
    pub fn status(&self) -> Snapshot {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.status.clone()
    }

    /// Cancels any pending reconnect, closes the control channel and tears down
    /// the session, then waits for the loop to exit.
    pub async fn shutdown(self) {
        let (done, finished) = oneshot::channel();
        if self.commands.send(Command::Shutdown(done)).await.is_ok() {
            let _ = finished.await;
        }
        if let Err(e) = self.task.await {
            warn!("receiver task ended abnormally: {e}");
        }
    }
}
