use anyhow::Result;
use axum::extract::ws::{Message, Utf8Bytes};
use foreman_model::{ClientFrame, ServerFrame};

/// Convert a server frame to a WebSocket message
pub fn frame_to_websocket(frame: &ServerFrame) -> Result<Message> {
    let json = serde_json::to_string(frame)?;
    Ok(Message::Text(Utf8Bytes::from(json)))
}

/// Convert a WebSocket message to a client frame
pub fn websocket_to_frame(msg: Message) -> Result<ClientFrame> {
    match msg {
        Message::Text(text) => {
            let frame: ClientFrame = serde_json::from_str(text.as_str())?;
            Ok(frame)
        }
        Message::Binary(bin) => {
            let frame: ClientFrame = serde_json::from_slice(bin.as_ref())?;
            Ok(frame)
        }
        _ => Err(anyhow::anyhow!("Unsupported message type")),
    }
}
