use crate::peer::types::{PeerEvent, PeerEvents};
use std::sync::Arc;
use tracing::{debug, info, trace};
use webrtc::data_channel::{data_channel_message::DataChannelMessage, RTCDataChannel};

/// Forwards the open/message/close events of the sender's data channel to the
/// receiver loop.
pub fn attach_dc(dc: &Arc<RTCDataChannel>, events: PeerEvents) {
    let label = dc.label().to_string();

    let open_events = events.clone();
    let open_label = label.clone();
    dc.on_open(Box::new(move || {
        info!(label = %open_label, session = %open_events.session(), "data channel open");
        open_events.emit(PeerEvent::DataChannelOpen);
        Box::pin(async {})
    }));

    let message_events = events.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        trace!(len = msg.data.len(), is_string = msg.is_string, "data channel message");
        message_events.emit(PeerEvent::DataChannelMessage(msg.data));
        Box::pin(async {})
    }));

    dc.on_close(Box::new(move || {
        debug!(label = %label, session = %events.session(), "data channel closed");
        events.emit(PeerEvent::DataChannelClosed);
        Box::pin(async {})
    }));
}
