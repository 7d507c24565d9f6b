//! Tracing setup and WebRTC diagnostics.

use crate::peer::ice::candidate_kind;
use thiserror::Error;
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::stats::StatsReportType;

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Installs the global subscriber. `RUST_LOG` overrides `default_level`.
pub fn init_tracing(format: LogFormat, default_level: Level) -> Result<(), TracingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("boatview={default_level},warn")))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Pretty => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().pretty()))?
        }
        LogFormat::Compact => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().compact()))?
        }
        LogFormat::Json => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))?
        }
    }
    Ok(())
}

/// Logs an ICE candidate as it is gathered (trickle ICE).
pub fn dump_candidate(label: &str, cand: &RTCIceCandidate) {
    if let Ok(init) = cand.to_json() {
        debug!(
            kind = candidate_kind(&init.candidate),
            sdp_mid = ?init.sdp_mid,
            sdp_mline_index = ?init.sdp_mline_index,
            "trickle {label}: {}",
            init.candidate
        );
    }
}

/// Logs the nominated candidate pair from `get_stats`.
pub async fn dump_selected_pair(pc: &RTCPeerConnection, moment: &str) {
    let stats = pc.get_stats().await;
    for (_, report) in stats.reports {
        if let StatsReportType::CandidatePair(pair) = report {
            if pair.nominated {
                info!(
                    local = %pair.local_candidate_id,
                    remote = %pair.remote_candidate_id,
                    bytes_sent = pair.bytes_sent,
                    bytes_received = pair.bytes_received,
                    state = ?pair.state,
                    "stats {moment}: nominated pair"
                );
            }
        }
    }
}
