//! WebSocket side of the signaling transport.

use super::protocol::Outbound;
use crate::error::Result;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// What the control channel reports back to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    Text(String),
    Error(String),
    Closed,
}

/// An open control channel.
///
/// Dropping it closes the underlying socket; nothing it produces afterwards is
/// observed.
#[derive(Debug)]
pub struct Connection {
    outgoing: mpsc::UnboundedSender<String>,
    incoming: mpsc::UnboundedReceiver<WireEvent>,
}

impl Connection {
    pub fn new(
        outgoing: mpsc::UnboundedSender<String>,
        incoming: mpsc::UnboundedReceiver<WireEvent>,
    ) -> Self {
        Self { outgoing, incoming }
    }

    /// Fire-and-forget send.
    pub fn send(&self, message: &Outbound) {
        match message.to_json() {
            Ok(json) => {
                debug!("sending signaling message: {json}");
                if self.outgoing.send(json).is_err() {
                    debug!("signaling writer gone, message dropped");
                }
            }
            Err(e) => warn!("could not encode {:?}: {e}", message.event()),
        }
    }

    /// Next event from the socket; a vanished reader counts as a close.
    pub async fn next_event(&mut self) -> WireEvent {
        self.incoming.recv().await.unwrap_or(WireEvent::Closed)
    }
}

/// Opens control channels to the relay.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(&self, url: &Url) -> Result<Connection>;
}

/// Dials the relay with tokio-tungstenite.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsDialer;

#[async_trait]
impl Dialer for WsDialer {
    async fn dial(&self, url: &Url) -> Result<Connection> {
        info!("connecting to signaling server: {url}");
        let (ws_stream, _) = connect_async(url.as_str()).await?;

        let (write, read) = ws_stream.split();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        tokio::spawn(sender_task(write, out_rx));
        tokio::spawn(receiver_task(read, in_tx));

        Ok(Connection::new(out_tx, in_rx))
    }
}

/// Forwards queued text to the socket; closes it once the queue is dropped.
async fn sender_task(
    mut write: futures::stream::SplitSink<WsStream, Message>,
    mut rx: mpsc::UnboundedReceiver<String>,
) {
    while let Some(text) = rx.recv().await {
        if let Err(e) = write.send(Message::Text(text)).await {
            error!("failed to send websocket message: {e}");
            break;
        }
    }

    let _ = write.send(Message::Close(None)).await;
    let _ = write.close().await;
    debug!("signaling sender task terminated");
}

async fn receiver_task(
    mut read: futures::stream::SplitStream<WsStream>,
    tx: mpsc::UnboundedSender<WireEvent>,
) {
    while let Some(msg) = read.next().await {
        let event = match msg {
            Ok(Message::Text(text)) => WireEvent::Text(text),
            Ok(Message::Close(frame)) => {
                debug!(?frame, "websocket close frame");
                break;
            }
            Ok(Message::Binary(data)) => {
                debug!(len = data.len(), "ignoring binary signaling frame");
                continue;
            }
            Ok(_) => continue,
            Err(e) => {
                let _ = tx.send(WireEvent::Error(e.to_string()));
                break;
            }
        };
        if tx.send(event).is_err() {
            break;
        }
    }

    let _ = tx.send(WireEvent::Closed);
    debug!("signaling receiver task terminated");
}
