//! Control-channel state machine.
//!
//! [`SignalingLink`] owns no sockets and no timers. It is fed [`LinkEvent`]s and
//! answers with [`LinkAction`]s for the runtime to carry out, which keeps the
//! reconnect and teardown rules testable without a network.

use super::protocol::{Inbound, Outbound, PeerSignal, Role};
use crate::status::Status;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Receiver started (or restarted after a teardown).
    Start,
    /// The dial succeeded.
    Opened,
    Message(String),
    Error(String),
    Closed,
    /// The reconnect delay elapsed.
    ReconnectDue,
    /// Receiver is going away.
    Teardown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkAction {
    Dial,
    Send(Outbound),
    Report(Status),
    ScheduleReconnect(Duration),
    CancelReconnect,
    Close,
    Deliver(PeerSignal),
}

#[derive(Debug)]
pub struct SignalingLink {
    state: LinkState,
    reconnect_delay: Duration,
    reconnect_pending: bool,
    torn_down: bool,
}

impl SignalingLink {
    pub fn new(reconnect_delay: Duration) -> Self {
        Self {
            state: LinkState::Disconnected,
            reconnect_delay,
            reconnect_pending: false,
            torn_down: false,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == LinkState::Connected
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    /// Guard for outbound traffic: messages are only ever sent on an open link.
    pub fn send(&self, message: Outbound) -> Option<LinkAction> {
        if self.is_open() {
            Some(LinkAction::Send(message))
        } else {
            debug!(event = ?message.event(), "link not open, dropping outbound message");
            None
        }
    }

    pub fn handle(&mut self, event: LinkEvent) -> Vec<LinkAction> {
        if self.torn_down && !matches!(event, LinkEvent::Start | LinkEvent::Teardown) {
            debug!(?event, "link torn down, ignoring event");
            return Vec::new();
        }

        match event {
            LinkEvent::Start => self.start(),
            LinkEvent::Opened => self.opened(),
            LinkEvent::Message(text) => self.message(&text),
            LinkEvent::Error(reason) => {
                warn!("signaling connection error: {reason}");
                vec![LinkAction::Report(Status::error("Connection error"))]
            }
            LinkEvent::Closed => self.closed(),
            LinkEvent::ReconnectDue => self.reconnect_due(),
            LinkEvent::Teardown => self.teardown(),
        }
    }

    fn start(&mut self) -> Vec<LinkAction> {
        self.torn_down = false;
        if self.state != LinkState::Disconnected {
            return Vec::new();
        }
        let mut actions = Vec::new();
        if self.reconnect_pending {
            self.reconnect_pending = false;
            actions.push(LinkAction::CancelReconnect);
        }
        self.state = LinkState::Connecting;
        actions.push(LinkAction::Dial);
        actions
    }

    fn opened(&mut self) -> Vec<LinkAction> {
        if self.state != LinkState::Connecting {
            debug!(state = ?self.state, "unexpected open, ignoring");
            return Vec::new();
        }
        info!("connected to signaling server");
        self.state = LinkState::Connected;
        vec![
            LinkAction::Report(Status::success("Connected - Ready to receive streams")),
            LinkAction::Send(Outbound::Identify(Role::Receiver)),
        ]
    }

    fn message(&mut self, text: &str) -> Vec<LinkAction> {
        if !self.is_open() {
            debug!("message on a link that is not open, ignoring");
            return Vec::new();
        }
        match Inbound::parse(text) {
            Ok(Some(Inbound::Paired { peer_id })) => {
                info!(%peer_id, "paired with sender");
                vec![LinkAction::Report(Status::info(format!(
                    "Paired with sender ({peer_id})"
                )))]
            }
            Ok(Some(Inbound::Signal(signal))) => vec![LinkAction::Deliver(signal)],
            Ok(None) => {
                debug!("ignoring signaling message: {text}");
                Vec::new()
            }
            Err(e) => {
                warn!("error parsing signaling message: {e}");
                Vec::new()
            }
        }
    }

    fn closed(&mut self) -> Vec<LinkAction> {
        if self.state == LinkState::Disconnected {
            debug!("link already closed");
            return Vec::new();
        }
        info!(
            delay_ms = self.reconnect_delay.as_millis() as u64,
            "signaling connection closed, reconnecting"
        );
        self.state = LinkState::Disconnected;
        self.reconnect_pending = true;
        vec![
            LinkAction::Report(Status::error("Disconnected from signaling server")),
            LinkAction::ScheduleReconnect(self.reconnect_delay),
        ]
    }

    fn reconnect_due(&mut self) -> Vec<LinkAction> {
        if !self.reconnect_pending || self.state != LinkState::Disconnected {
            return Vec::new();
        }
        self.reconnect_pending = false;
        self.state = LinkState::Connecting;
        vec![LinkAction::Dial]
    }

    fn teardown(&mut self) -> Vec<LinkAction> {
        self.torn_down = true;
        let mut actions = Vec::new();
        if self.reconnect_pending {
            self.reconnect_pending = false;
            actions.push(LinkAction::CancelReconnect);
        }
        if self.state != LinkState::Disconnected {
            actions.push(LinkAction::Close);
        }
        self.state = LinkState::Disconnected;
        actions
    }
}
