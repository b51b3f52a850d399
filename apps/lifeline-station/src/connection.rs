use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use lifeline_proto::{ClientMessage, ClientRole, ServerMessage};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// One live WebSocket link to the relay. Opening the connection identifies
/// this party immediately; the relay answers with `identified` and, on the
/// session's first identification, a history snapshot.
pub struct Connection {
    tx: mpsc::UnboundedSender<ClientMessage>,
    rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Connection {
    pub async fn open(server_url: &str, role: ClientRole) -> Result<Self> {
        let ws_url = endpoint(server_url);
        let (ws_stream, _) = connect_async(&ws_url).await?;

        let (tx_out, rx_out) = mpsc::unbounded_channel::<ClientMessage>();
        let (tx_in, rx_in) = mpsc::unbounded_channel::<ServerMessage>();

        tx_out.send(ClientMessage::Identify { client_type: role })?;
        tokio::spawn(pump(ws_stream, rx_out, tx_in));

        Ok(Self {
            tx: tx_out,
            rx: rx_in,
        })
    }

    /// A handle for sending on this link; goes dead with the connection.
    pub fn sender(&self) -> mpsc::UnboundedSender<ClientMessage> {
        self.tx.clone()
    }

    /// Next message from the relay; `None` means the link is gone.
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.rx.recv().await
    }
}

/// Build the `/ws` endpoint URL, defaulting to ws:// for local relays and
/// wss:// for anything remote.
fn endpoint(server_url: &str) -> String {
    let server_url = server_url.trim_end_matches('/');
    if server_url.starts_with("ws://") || server_url.starts_with("wss://") {
        format!("{server_url}/ws")
    } else if server_url.contains("localhost") || server_url.contains("127.0.0.1") {
        format!("ws://{server_url}/ws")
    } else {
        format!("wss://{server_url}/ws")
    }
}

async fn pump(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut rx_out: mpsc::UnboundedReceiver<ClientMessage>,
    tx_in: mpsc::UnboundedSender<ServerMessage>,
) {
    let (mut sink, mut stream) = ws_stream.split();

    let send_task = tokio::spawn(async move {
        while let Some(message) = rx_out.recv().await {
            if let Ok(json) = serde_json::to_string(&message) {
                if sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(message) => {
                    if tx_in.send(message).is_err() {
                        break;
                    }
                }
                Err(error) => debug!(%error, "ignoring unrecognized frame from relay"),
            },
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    send_task.abort();
}
