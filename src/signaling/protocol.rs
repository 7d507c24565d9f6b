//! Relay wire format: JSON text frames `{"event": ..., "data": {...}}`.

use crate::error::Result;
use crate::peer::types::{IceCandidate, SessionDescription};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Identify,
    Paired,
    Offer,
    Answer,
    IceCandidate,
    PeerDisconnected,
}

/// Envelope as it appears on the control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalingEnvelope {
    pub event: EventKind,
    #[serde(default)]
    pub data: Value,
}

/// Which side of the relay pairing this client is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Receiver,
}

/// Messages this client sends to the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Identify(Role),
    Answer(SessionDescription),
    IceCandidate(IceCandidate),
}

impl Outbound {
    pub fn event(&self) -> EventKind {
        match self {
            Outbound::Identify(_) => EventKind::Identify,
            Outbound::Answer(_) => EventKind::Answer,
            Outbound::IceCandidate(_) => EventKind::IceCandidate,
        }
    }

    pub fn to_envelope(&self) -> Result<SignalingEnvelope> {
        let data = match self {
            Outbound::Identify(role) => json!({ "type": role }),
            Outbound::Answer(answer) => json!({ "answer": serde_json::to_value(answer)? }),
            Outbound::IceCandidate(candidate) => {
                json!({ "candidate": serde_json::to_value(candidate)? })
            }
        };
        Ok(SignalingEnvelope {
            event: self.event(),
            data,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_envelope()?)?)
    }
}

/// Messages the relay sends to a receiver.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Handled by the link itself as a status line.
    Paired { peer_id: String },
    Signal(PeerSignal),
}

/// Relay messages the peer manager acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerSignal {
    Offer(SessionDescription),
    IceCandidate(IceCandidate),
    PeerDisconnected,
}

#[derive(Deserialize)]
struct RawEnvelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairedData {
    peer_id: Value,
}

#[derive(Deserialize)]
struct OfferData {
    offer: SessionDescription,
}

#[derive(Deserialize)]
struct CandidateData {
    #[serde(default)]
    candidate: Option<IceCandidate>,
}

impl Inbound {
    /// Parses one text frame.
    ///
    /// `Ok(None)` means the frame was valid JSON but carries nothing a receiver
    /// acts on: an unknown event, one of our own outbound events echoed back, or
    /// an end-of-candidates marker.
    pub fn parse(text: &str) -> Result<Option<Inbound>> {
        let raw: RawEnvelope = serde_json::from_str(text)?;

        let inbound = match raw.event.as_str() {
            "paired" => {
                let data: PairedData = serde_json::from_value(raw.data)?;
                let peer_id = match data.peer_id {
                    Value::String(id) => id,
                    other => other.to_string(),
                };
                Inbound::Paired { peer_id }
            }
            "offer" => {
                let data: OfferData = serde_json::from_value(raw.data)?;
                Inbound::Signal(PeerSignal::Offer(data.offer))
            }
            "ice-candidate" => {
                let data: CandidateData = serde_json::from_value(raw.data)?;
                match data.candidate {
                    Some(candidate) => Inbound::Signal(PeerSignal::IceCandidate(candidate)),
                    None => return Ok(None),
                }
            }
            "peer-disconnected" => Inbound::Signal(PeerSignal::PeerDisconnected),
            _ => return Ok(None),
        };
        Ok(Some(inbound))
    }
}
