use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use foreman_model::{ClientFrame, ServerFrame};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error};

use crate::infra::app_state::AppState;
use crate::websocket::{messages, ClientSession};

/// Handle WebSocket upgrade request
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (session, mut rx) = ClientSession::new();
    let session_id = session.id;

    // The initial snapshot goes into the session queue before the
    // session joins the broadcast set, so the first frame a client
    // ever receives is `init`.
    let init = ServerFrame::Init {
        repos: state.registry.snapshot_all(),
    };
    if session.send(init).await.is_err() {
        return;
    }
    state.clients.add(session);

    // Outgoing pump: drain the session queue in order.
    let pump = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match messages::frame_to_websocket(&frame) {
                Ok(msg) => {
                    if ws_sender.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    error!(%err, "failed to encode frame");
                }
            }
        }
    });

    // Incoming loop: clients only ever ask for refreshes.
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Close(_)) => break,
            Ok(msg @ (Message::Text(_) | Message::Binary(_))) => {
                match messages::websocket_to_frame(msg) {
                    Ok(ClientFrame::Refresh { repo }) => {
                        debug!(session = %session_id, %repo, "client refresh");
                        if let Err(err) =
                            state.registry.refresh(&repo).await
                        {
                            debug!(%repo, %err, "client refresh failed");
                        }
                    }
                    Err(err) => {
                        debug!(session = %session_id, %err, "unparseable frame");
                    }
                }
            }
            Ok(_) => {}
            Err(err) => {
                debug!(session = %session_id, %err, "websocket error");
                break;
            }
        }
    }

    // Clean up on disconnect
    state.clients.remove(session_id);
    pump.abort();
}
