use crate::error::{Error, Result};
use crate::logger::{dump_candidate, dump_selected_pair};
use crate::peer::data_channel::attach_dc;
use crate::peer::ice::rtc_ice_servers;
use crate::peer::state::DATA_CHANNEL_LABEL;
use crate::peer::types::{
    IceCandidate, PeerEvent, PeerEvents, SdpKind, ServerConfig, SessionDescription,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::{
    api::APIBuilder,
    data_channel::RTCDataChannel,
    peer_connection::{
        configuration::RTCConfiguration, peer_connection_state::RTCPeerConnectionState,
        sdp::session_description::RTCSessionDescription, RTCPeerConnection,
    },
};

/// Creates one peer connection per session.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Builds a connection whose callbacks all report through `events`.
    async fn open(&self, events: PeerEvents) -> Result<Box<dyn PeerHandle>>;
}

/// The receiving end of one negotiated session.
#[async_trait]
pub trait PeerHandle: Send + Sync {
    /// Applies the remote offer and returns the local answer, already applied.
    async fn accept_offer(&self, offer: SessionDescription) -> Result<SessionDescription>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Closes the data channel and the connection. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// [`PeerConnector`] backed by webrtc-rs.
#[derive(Debug, Clone)]
pub struct RtcConnector {
    ice_servers: Vec<ServerConfig>,
}

impl RtcConnector {
    pub fn new(ice_servers: Vec<ServerConfig>) -> Self {
        Self { ice_servers }
    }

    fn rtc_config(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: rtc_ice_servers(&self.ice_servers),
            bundle_policy: RTCBundlePolicy::MaxBundle,
            rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
            ..Default::default()
        }
    }
}

#[async_trait]
impl PeerConnector for RtcConnector {
    async fn open(&self, events: PeerEvents) -> Result<Box<dyn PeerHandle>> {
        let peer = new_peer(self.rtc_config(), events).await?;
        Ok(Box::new(peer))
    }
}

pub struct RtcPeer {
    pc: Arc<RTCPeerConnection>,
    data_channel: Arc<Mutex<Option<Arc<RTCDataChannel>>>>,
    closed: AtomicBool,
}

/// Builds the peer connection and installs every handler before any
/// negotiation happens. The receiver never creates a data channel itself; it
/// waits for the sender's.
pub async fn new_peer(config: RTCConfiguration, events: PeerEvents) -> Result<RtcPeer> {
    let api = APIBuilder::new().build();
    let pc = Arc::new(api.new_peer_connection(config).await?);
    info!(session = %events.session(), "peer connection created");

    let candidate_events = events.clone();
    pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
        let events = candidate_events.clone();
        Box::pin(async move {
            let Some(c) = cand else {
                debug!(session = %events.session(), "ICE gathering complete");
                return;
            };
            dump_candidate("LOCAL", &c);
            match c.to_json() {
                Ok(init) => events.emit(PeerEvent::LocalCandidate(init.into())),
                Err(e) => warn!("could not serialize local candidate: {e}"),
            }
        })
    }));

    // weak: the handler lives inside the connection it inspects
    let stats_pc = Arc::downgrade(&pc);
    let state_events = events.clone();
    pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
        let events = state_events.clone();
        let stats_pc = stats_pc.clone();
        Box::pin(async move {
            info!(session = %events.session(), "peer connection state changed to {st}");
            if matches!(
                st,
                RTCPeerConnectionState::Failed | RTCPeerConnectionState::Disconnected
            ) {
                if let Some(pc) = stats_pc.upgrade() {
                    dump_selected_pair(&pc, "BEFORE-FAIL").await;
                }
            }
            events.emit(PeerEvent::ConnectionState(st));
        })
    }));

    let data_channel = Arc::new(Mutex::new(None));
    let slot = data_channel.clone();
    pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
        info!(label = dc.label(), "remote data channel announced");
        if dc.label() != DATA_CHANNEL_LABEL {
            warn!(label = dc.label(), "unexpected data channel label, using it anyway");
        }
        attach_dc(&dc, events.clone());
        let slot = slot.clone();
        Box::pin(async move {
            let previous = slot.lock().await.replace(dc);
            if let Some(previous) = previous {
                debug!(label = previous.label(), "replacing data channel");
                let _ = previous.close().await;
            }
        })
    }));

    Ok(RtcPeer {
        pc,
        data_channel,
        closed: AtomicBool::new(false),
    })
}

#[async_trait]
impl PeerHandle for RtcPeer {
    async fn accept_offer(&self, offer: SessionDescription) -> Result<SessionDescription> {
        if offer.kind != SdpKind::Offer {
            return Err(Error::Negotiation(format!(
                "expected an offer, got {:?}",
                offer.kind
            )));
        }

        let remote = RTCSessionDescription::offer(offer.sdp)?;
        self.pc.set_remote_description(remote).await?;

        let answer = self.pc.create_answer(None).await?;
        self.pc.set_local_description(answer).await?;

        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| Error::Negotiation("no local description after answer".into()))?;
        Ok(SessionDescription::answer(local.sdp))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.pc.add_ice_candidate(candidate.into()).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let dc = self.data_channel.lock().await.take();
        if let Some(dc) = dc {
            if let Err(e) = dc.close().await {
                debug!("data channel close: {e}");
            }
        }
        self.pc.close().await?;
        Ok(())
    }
}
