//! Frame sink and display surfaces.
//!
//! Frames arrive on the data channel as JSON text `{"base64": "<image source>"}`.
//! The source string is handed to a [`DisplaySurface`] untouched; only
//! [`FileSurface`] looks inside it to write the image bytes out.

use crate::error::{Error, Result};
use crate::status::Reporter;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// One data-channel frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramePayload {
    #[serde(default)]
    pub base64: String,
}

impl FramePayload {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text =
            std::str::from_utf8(data).map_err(|e| Error::Frame(format!("not utf-8: {e}")))?;
        serde_json::from_str(text).map_err(|e| Error::Frame(e.to_string()))
    }
}

/// Where frames end up. Implementations only ever keep the latest one.
pub trait DisplaySurface: Send + Sync {
    /// Replaces the displayed image with `src` (data URI or bare base64).
    fn set_source(&self, src: &str);

    fn hide_placeholder(&self);
}

/// Routes data-channel payloads to a display surface.
pub struct FrameSink {
    surface: Arc<dyn DisplaySurface>,
    reporter: Reporter,
}

impl FrameSink {
    pub fn new(surface: Arc<dyn DisplaySurface>, reporter: Reporter) -> Self {
        Self { surface, reporter }
    }

    /// Renders one payload. Bad payloads are logged and dropped; returns whether
    /// the surface was updated.
    pub fn render(&self, data: &[u8]) -> bool {
        let payload = match FramePayload::parse(data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(len = data.len(), "dropping frame: {e}");
                return false;
            }
        };

        if payload.base64.is_empty() {
            debug!("frame without image data, ignoring");
            return false;
        }

        trace!(len = payload.base64.len(), "rendering frame");
        self.surface.set_source(&payload.base64);
        self.surface.hide_placeholder();
        self.reporter.frame_rendered(Utc::now());
        true
    }
}

/// In-memory surface holding the current image source.
#[derive(Debug)]
pub struct LatestFrame {
    source: Mutex<Option<String>>,
    placeholder_visible: AtomicBool,
}

impl Default for LatestFrame {
    fn default() -> Self {
        Self {
            source: Mutex::new(None),
            placeholder_visible: AtomicBool::new(true),
        }
    }
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self) -> Option<String> {
        self.source
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn placeholder_visible(&self) -> bool {
        self.placeholder_visible.load(Ordering::Acquire)
    }
}

impl DisplaySurface for LatestFrame {
    fn set_source(&self, src: &str) {
        *self
            .source
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(src.to_string());
    }

    fn hide_placeholder(&self) {
        self.placeholder_visible.store(false, Ordering::Release);
    }
}

/// Writes each frame's image bytes over the previous one.
///
/// Frames are handed to a writer task through a `watch` channel, so a slow
/// disk never holds up the receiver loop and frames that arrive while a write
/// is in flight collapse into the newest one. The writer stops when the
/// surface is dropped.
#[derive(Debug)]
pub struct FileSurface {
    path: PathBuf,
    latest: watch::Sender<Option<String>>,
}

impl FileSurface {
    /// Spawns the writer task; call from within a tokio runtime.
    pub fn spawn(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (latest, rx) = watch::channel(None);
        tokio::spawn(write_frames(path.clone(), rx));
        Self { path, latest }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DisplaySurface for FileSurface {
    fn set_source(&self, src: &str) {
        self.latest.send_replace(Some(src.to_string()));
    }

    fn hide_placeholder(&self) {}
}

async fn write_frames(path: PathBuf, mut rx: watch::Receiver<Option<String>>) {
    while rx.changed().await.is_ok() {
        let Some(src) = rx.borrow_and_update().clone() else {
            continue;
        };
        match write_frame(&path, &src).await {
            Ok(len) => trace!(path = %path.display(), len, "frame written"),
            Err(e) => warn!(path = %path.display(), "could not write frame: {e}"),
        }
    }
    debug!(path = %path.display(), "frame writer stopped");
}

async fn write_frame(path: &Path, src: &str) -> Result<usize> {
    let bytes = decode_image_source(src)?;
    let tmp = path.with_extension("partial");
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(bytes.len())
}

/// Decodes a `data:<mime>;base64,<payload>` URI or bare base64 into bytes.
pub fn decode_image_source(src: &str) -> Result<Vec<u8>> {
    let encoded = match src.strip_prefix("data:") {
        Some(rest) => {
            let (meta, data) = rest
                .split_once(',')
                .ok_or_else(|| Error::Frame("data uri without ','".into()))?;
            if !meta.ends_with(";base64") {
                return Err(Error::Frame(format!("data uri is not base64: {meta}")));
            }
            data
        }
        None => src,
    };

    general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::Frame(format!("bad base64: {e}")))
}
