use anyhow::Result;
use chrono::{Local, TimeZone};
use lifeline_proto::{ChatEvent, ClientMessage, ServerMessage};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::cache::CacheStore;
use crate::reconcile::merge;
use crate::reconnect::RETRY_INTERVAL;

/// The interactive side of a station: stdin lines become chat events,
/// relay messages become console output, history snapshots are reconciled
/// into the local cache.
pub struct Console {
    pub sender_label: String,
    pub cache: CacheStore,
    pub link: watch::Receiver<Option<mpsc::UnboundedSender<ClientMessage>>>,
    pub incoming: mpsc::UnboundedReceiver<ServerMessage>,
    pub shutdown: CancellationToken,
}

impl Console {
    pub async fn run(mut self) -> Result<()> {
        self.render_all();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    self.shutdown.cancel();
                    break;
                }
                changed = self.link.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if self.link.borrow().is_some() {
                        println!("-- connected to relay --");
                    } else {
                        println!(
                            "-- disconnected, retrying every {}s --",
                            RETRY_INTERVAL.as_secs()
                        );
                    }
                }
                line = lines.next_line() => match line? {
                    Some(line) => self.send_line(&line),
                    None => {
                        self.shutdown.cancel();
                        break;
                    }
                },
                message = self.incoming.recv() => match message {
                    Some(message) => self.handle_server(message),
                    None => break,
                },
            }
        }
        Ok(())
    }

    fn send_line(&mut self, line: &str) {
        let text = line.trim();
        if text.is_empty() {
            return;
        }
        let current_link = self.link.borrow().clone();
        let Some(tx) = current_link else {
            println!("-- not connected; reconnect is in progress, resend once the link is back --");
            return;
        };
        let event = ChatEvent::new(self.sender_label.clone(), text, None);
        let sent = tx.send(ClientMessage::Chat {
            sender: event.sender.clone(),
            text: event.text.clone(),
            timestamp: Some(event.timestamp),
        });
        if sent.is_err() {
            println!("-- connection just dropped; message not sent, please retry --");
            return;
        }
        self.cache.append(event);
    }

    fn handle_server(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Connected {
                message,
                active_clients,
                ..
            } => println!("-- {message} ({active_clients} online) --"),
            ServerMessage::Identified { client_type, .. } => {
                println!("-- identified as {} --", client_type.label())
            }
            ServerMessage::History { messages } => {
                let merged = merge(self.cache.entries(), &messages);
                self.cache.replace(merged);
                // Full re-render keeps snapshot application idempotent.
                self.render_all();
            }
            ServerMessage::Chat { event } => {
                render_event(&event);
                self.cache.append(event);
            }
            ServerMessage::Typing { sender, is_typing } => {
                if is_typing {
                    println!("-- {sender} is typing --");
                }
            }
            ServerMessage::Status {
                message,
                active_clients,
            } => println!("-- {message} ({active_clients} online) --"),
            // Telemetry is for dashboards; the console has nothing to draw.
            ServerMessage::Ecg { .. }
            | ServerMessage::Vitals { .. }
            | ServerMessage::Location { .. } => {}
        }
    }

    fn render_all(&self) {
        let entries = self.cache.entries();
        println!("--- chat history ({} messages) ---", entries.len());
        for event in entries {
            render_event(event);
        }
    }
}

fn render_event(event: &ChatEvent) {
    println!(
        "[{}] {}: {}",
        format_time(event.timestamp),
        event.sender,
        event.text
    );
}

fn format_time(timestamp: u64) -> String {
    Local
        .timestamp_millis_opt(timestamp as i64)
        .single()
        .map(|time| time.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}
