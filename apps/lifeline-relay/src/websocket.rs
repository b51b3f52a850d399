use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use lifeline_proto::{generate_session_id, ClientMessage, ServerMessage};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::hub::HubHandle;

/// WebSocket upgrade handler.
pub async fn websocket_handler(ws: WebSocketUpgrade, State(hub): State<HubHandle>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Drive one connection: pump hub messages out, parse frames in, and tell
/// the hub when the socket goes away. Parsing happens here so a malformed
/// frame from one party never reaches the hub or anyone else.
async fn handle_socket(socket: WebSocket, hub: HubHandle) {
    let session_id = generate_session_id();
    let (mut sink, mut stream) = socket.split();

    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let pump_session = session_id.clone();
    tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => {
                    if sink.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(error) => warn!(session = %pump_session, %error, "unserializable message"),
            }
        }
        debug!(session = %pump_session, "outbound pump ended");
    });

    debug!(session = %session_id, "websocket connected");
    hub.connected(session_id.clone(), outbound);

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(error) => {
                debug!(session = %session_id, %error, "websocket read error");
                break;
            }
        };
        match frame {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => hub.inbound(session_id.clone(), message),
                // Dropped with no reply; the connection stays open.
                Err(error) => {
                    warn!(session = %session_id, %error, "dropping malformed message")
                }
            },
            Message::Close(_) => {
                debug!(session = %session_id, "received close frame");
                break;
            }
            // Ping/pong are handled by axum; binary frames are not part of
            // the protocol.
            _ => {}
        }
    }

    hub.disconnected(session_id.clone());
    debug!(session = %session_id, "websocket disconnected");
}
