use crate::error::{Error, Result};
use crate::peer::types::ServerConfig;
use crate::utils::add_ice_url_scheme;
use tracing::debug;
use webrtc::ice_transport::ice_server::RTCIceServer;

/// Public STUN servers used when nothing else is configured.
pub fn default_ice_servers() -> Vec<ServerConfig> {
    vec![
        ServerConfig {
            id: "default-stun".into(),
            r#type: "stun".into(),
            url: "stun:stun.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
        ServerConfig {
            id: "default-stun-1".into(),
            r#type: "stun".into(),
            url: "stun:stun1.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
    ]
}

/// Turns configured servers into what the WebRTC stack expects.
pub fn rtc_ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| {
            let url = add_ice_url_scheme(config);
            debug!(id = %config.id, %url, "using ICE server");

            RTCIceServer {
                urls: vec![url],
                username: config.username.clone().unwrap_or_default(),
                credential: config.credential.clone().unwrap_or_default(),
            }
        })
        .collect()
}

/// Rejects server lists the peer connection could not use.
pub fn validate_ice_servers(servers: &[ServerConfig]) -> Result<()> {
    for server in servers {
        if server.url.trim().is_empty() {
            return Err(Error::Config(format!(
                "ICE server '{}' has an empty url",
                server.id
            )));
        }

        match server.r#type.as_str() {
            "stun" => {}
            "turn" => {
                if server.username.is_none() || server.credential.is_none() {
                    return Err(Error::Config(format!(
                        "TURN server '{}' requires username and credential",
                        server.id
                    )));
                }
            }
            other => {
                return Err(Error::Config(format!(
                    "ICE server '{}' has unknown type '{other}'",
                    server.id
                )))
            }
        }
    }
    Ok(())
}

/// Candidate type taken from the `typ` field, for logs.
pub fn candidate_kind(candidate: &str) -> &'static str {
    if candidate.contains("typ host") {
        "host"
    } else if candidate.contains("typ srflx") {
        "srflx"
    } else if candidate.contains("typ relay") {
        "relay"
    } else if candidate.contains("typ prflx") {
        "prflx"
    } else {
        "unknown"
    }
}
