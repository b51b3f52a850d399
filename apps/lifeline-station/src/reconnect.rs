use lifeline_proto::{ClientMessage, ClientRole, ServerMessage};
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::connection::Connection;

/// Fixed delay between reconnect attempts. No cap, no backoff.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Supervised connect/identify/retry loop. One driver task owns the whole
/// lifecycle, so a retry can never be armed twice; cancelling `shutdown` is
/// the only intentional way out.
pub struct ReconnectDriver {
    pub url: String,
    pub role: ClientRole,
    /// Publishes the current link: a live sender while connected, `None`
    /// while down. Consumers read this to fail sends synchronously.
    pub link: watch::Sender<Option<mpsc::UnboundedSender<ClientMessage>>>,
    pub incoming: mpsc::UnboundedSender<ServerMessage>,
    pub shutdown: CancellationToken,
}

impl ReconnectDriver {
    pub async fn run(self) {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            match Connection::open(&self.url, self.role).await {
                Ok(mut connection) => {
                    info!("relay link established");
                    let _ = self.link.send(Some(connection.sender()));
                    loop {
                        tokio::select! {
                            _ = self.shutdown.cancelled() => {
                                let _ = self.link.send(None);
                                return;
                            }
                            message = connection.recv() => match message {
                                Some(message) => {
                                    if self.incoming.send(message).is_err() {
                                        return;
                                    }
                                }
                                None => break,
                            }
                        }
                    }
                    let _ = self.link.send(None);
                    warn!(
                        "relay link lost; retrying in {}s",
                        RETRY_INTERVAL.as_secs()
                    );
                }
                Err(error) => {
                    warn!(%error, "relay connect failed; retrying in {}s", RETRY_INTERVAL.as_secs());
                }
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(RETRY_INTERVAL) => {}
            }
        }
    }
}
