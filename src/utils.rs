use crate::config::SIGNALING_PATH;
use crate::error::{Error, Result};
use crate::peer::types::ServerConfig;
use url::Url;

/// Prepends `stun:` or `turn:` to an ICE server url that has no scheme yet.
pub fn add_ice_url_scheme(config: &ServerConfig) -> String {
    if config.url.starts_with("turn:")
        || config.url.starts_with("turns:")
        || config.url.starts_with("stun:")
        || config.url.starts_with("stuns:")
    {
        config.url.clone()
    } else {
        let scheme = if config.r#type == "turn" {
            "turn:"
        } else {
            "stun:"
        };
        format!("{}{}", scheme, config.url)
    }
}

/// Derives the relay's signaling endpoint from a base url.
///
/// `http` becomes `ws` and `https` becomes `wss`; `ws`/`wss` are kept as-is and
/// `/signaling` is appended to whatever path the base already has.
pub fn signaling_endpoint(base: &str) -> Result<Url> {
    let mut url =
        Url::parse(base.trim()).map_err(|e| Error::InvalidUrl(format!("{base}: {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::InvalidUrl(format!(
                "{base}: unsupported scheme '{other}'"
            )))
        }
    };
    if url.scheme() != scheme {
        url.set_scheme(scheme)
            .map_err(|_| Error::InvalidUrl(format!("{base}: cannot switch to {scheme}")))?;
    }

    let path = format!("{}{}", url.path().trim_end_matches('/'), SIGNALING_PATH);
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
