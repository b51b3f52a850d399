use lifeline_proto::{ChatEvent, ClientMessage, ServerMessage};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::history::HistoryLog;
use crate::registry::Registry;

/// Everything the hub reacts to, funneled through one channel so each event
/// is processed to completion before the next. The registry and the log are
/// mutated nowhere else.
pub enum HubEvent {
    Connected {
        session_id: String,
        outbound: mpsc::UnboundedSender<ServerMessage>,
    },
    Inbound {
        session_id: String,
        message: ClientMessage,
    },
    Disconnected {
        session_id: String,
    },
}

/// Cheap handle the connection tasks use to feed the hub.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubEvent>,
}

impl HubHandle {
    pub fn connected(&self, session_id: String, outbound: mpsc::UnboundedSender<ServerMessage>) {
        let _ = self.tx.send(HubEvent::Connected {
            session_id,
            outbound,
        });
    }

    pub fn inbound(&self, session_id: String, message: ClientMessage) {
        let _ = self.tx.send(HubEvent::Inbound {
            session_id,
            message,
        });
    }

    pub fn disconnected(&self, session_id: String) {
        let _ = self.tx.send(HubEvent::Disconnected { session_id });
    }
}

pub struct Hub {
    registry: Registry,
    history: HistoryLog,
    snapshot_limit: usize,
    rx: mpsc::UnboundedReceiver<HubEvent>,
}

impl Hub {
    pub fn new(history: HistoryLog, snapshot_limit: usize) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = Self {
            registry: Registry::new(),
            history,
            snapshot_limit,
            rx,
        };
        (hub, HubHandle { tx })
    }

    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            self.handle(event);
        }
    }

    fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Connected {
                session_id,
                outbound,
            } => {
                self.registry.register(session_id.clone(), outbound);
                let active_clients = self.registry.len();
                debug!(session = %session_id, active_clients, "session registered");
                self.send_to(
                    &session_id,
                    ServerMessage::Connected {
                        message: "connected to lifeline relay".into(),
                        client_id: session_id.clone(),
                        active_clients,
                    },
                );
            }
            HubEvent::Inbound {
                session_id,
                message,
            } => self.handle_message(&session_id, message),
            HubEvent::Disconnected { session_id } => {
                let Some(role) = self.registry.deregister(&session_id) else {
                    return;
                };
                info!(session = %session_id, role = role.label(), "session closed");
                self.fan_out(
                    &session_id,
                    ServerMessage::Status {
                        message: format!("{} disconnected", role.label()),
                        active_clients: self.registry.len(),
                    },
                );
            }
        }
    }

    fn handle_message(&mut self, session_id: &str, message: ClientMessage) {
        match message {
            ClientMessage::Identify { client_type } => {
                let Some(first) = self.registry.set_role(session_id, client_type) else {
                    debug!(session = %session_id, "identify from dead session ignored");
                    return;
                };
                info!(session = %session_id, role = client_type.label(), first, "session identified");
                self.send_to(
                    session_id,
                    ServerMessage::Identified {
                        client_id: session_id.to_string(),
                        client_type,
                    },
                );
                // History goes out once per session, and only when there is any.
                if first {
                    let messages = self.history.recent(self.snapshot_limit);
                    if !messages.is_empty() {
                        self.send_to(session_id, ServerMessage::History { messages });
                    }
                }
            }
            ClientMessage::Chat {
                sender,
                text,
                timestamp,
            } => {
                let text = text.trim();
                if text.is_empty() {
                    debug!(session = %session_id, "dropping chat with empty text");
                    return;
                }
                let event = ChatEvent::new(sender, text, timestamp);
                self.history.append(event.clone());
                self.fan_out(session_id, ServerMessage::Chat { event });
            }
            ClientMessage::Ecg { sample } => {
                self.fan_out(session_id, ServerMessage::Ecg { sample });
            }
            ClientMessage::Vitals { reading } => {
                self.fan_out(session_id, ServerMessage::Vitals { reading });
            }
            ClientMessage::Location { fix } => {
                self.fan_out(session_id, ServerMessage::Location { fix });
            }
            ClientMessage::Typing { sender, is_typing } => {
                self.fan_out(session_id, ServerMessage::Typing { sender, is_typing });
            }
        }
    }

    fn send_to(&self, session_id: &str, message: ServerMessage) {
        let Some(session) = self.registry.get(session_id) else {
            return;
        };
        if !session.send(message) {
            warn!(session = %session_id, "send to closed session dropped");
        }
    }

    /// Deliver to every live session except the origin. Exclusion is by
    /// session id, never by role, so two field units see each other.
    fn fan_out(&self, origin: &str, message: ServerMessage) {
        self.registry.each_other(origin, |session_id, session| {
            if !session.send(message.clone()) {
                debug!(session = %session_id, "fan-out to closed session dropped");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_proto::ClientRole;

    struct TestPeer {
        id: String,
        rx: mpsc::UnboundedReceiver<ServerMessage>,
    }

    impl TestPeer {
        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                out.push(msg);
            }
            out
        }
    }

    fn new_hub() -> Hub {
        let (hub, _handle) = Hub::new(HistoryLog::empty(), 100);
        hub
    }

    fn connect(hub: &mut Hub, id: &str) -> TestPeer {
        let (tx, rx) = mpsc::unbounded_channel();
        hub.handle(HubEvent::Connected {
            session_id: id.to_string(),
            outbound: tx,
        });
        TestPeer {
            id: id.to_string(),
            rx,
        }
    }

    fn identify(hub: &mut Hub, peer: &TestPeer, role: ClientRole) {
        hub.handle(HubEvent::Inbound {
            session_id: peer.id.clone(),
            message: ClientMessage::Identify { client_type: role },
        });
    }

    fn send_chat(hub: &mut Hub, peer: &TestPeer, sender: &str, text: &str, timestamp: Option<u64>) {
        hub.handle(HubEvent::Inbound {
            session_id: peer.id.clone(),
            message: ClientMessage::Chat {
                sender: sender.into(),
                text: text.into(),
                timestamp,
            },
        });
    }

    fn chats(messages: &[ServerMessage]) -> Vec<&ChatEvent> {
        messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::Chat { event } => Some(event),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn sender_never_receives_its_own_chat() {
        let mut hub = new_hub();
        let mut hospital = connect(&mut hub, "hospital-1");
        let mut unit = connect(&mut hub, "unit-1");
        identify(&mut hub, &hospital, ClientRole::Hospital);
        identify(&mut hub, &unit, ClientRole::FieldUnit);
        hospital.drain();
        unit.drain();

        send_chat(&mut hub, &unit, "fieldUnit", "en route", Some(1000));

        assert!(chats(&hospital.drain()).len() == 1);
        assert!(chats(&unit.drain()).is_empty(), "no self-echo");
    }

    #[test]
    fn late_identify_receives_history_snapshot() {
        // Scenario A: hospital chats before the field unit identifies.
        let mut hub = new_hub();
        let hospital = connect(&mut hub, "hospital-1");
        identify(&mut hub, &hospital, ClientRole::Hospital);
        send_chat(&mut hub, &hospital, "doctor", "status?", Some(1000));

        let mut unit = connect(&mut hub, "unit-1");
        identify(&mut hub, &unit, ClientRole::FieldUnit);

        let received = unit.drain();
        let history: Vec<&Vec<ChatEvent>> = received
            .iter()
            .filter_map(|m| match m {
                ServerMessage::History { messages } => Some(messages),
                _ => None,
            })
            .collect();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].len(), 1);
        assert_eq!(history[0][0].sender, "doctor");
        assert_eq!(history[0][0].text, "status?");
        assert_eq!(history[0][0].timestamp, 1000);
    }

    #[test]
    fn no_history_snapshot_when_log_is_empty() {
        let mut hub = new_hub();
        let mut unit = connect(&mut hub, "unit-1");
        identify(&mut hub, &unit, ClientRole::FieldUnit);

        let received = unit.drain();
        assert!(received
            .iter()
            .all(|m| !matches!(m, ServerMessage::History { .. })));
    }

    #[test]
    fn reidentify_overwrites_role_without_replaying_history() {
        let mut hub = new_hub();
        let hospital = connect(&mut hub, "hospital-1");
        identify(&mut hub, &hospital, ClientRole::Hospital);
        send_chat(&mut hub, &hospital, "doctor", "status?", Some(1000));

        let mut unit = connect(&mut hub, "unit-1");
        identify(&mut hub, &unit, ClientRole::FieldUnit);
        unit.drain();

        identify(&mut hub, &unit, ClientRole::Hospital);
        let received = unit.drain();
        assert!(
            received
                .iter()
                .any(|m| matches!(m, ServerMessage::Identified { .. })),
            "re-identify is still confirmed"
        );
        assert!(
            received
                .iter()
                .all(|m| !matches!(m, ServerMessage::History { .. })),
            "history goes out once per session"
        );
    }

    #[test]
    fn chat_flows_one_way_when_only_hospital_listens() {
        // Scenario B: field unit sends while only the hospital is connected.
        let mut hub = new_hub();
        let mut hospital = connect(&mut hub, "hospital-1");
        let mut unit = connect(&mut hub, "unit-1");
        identify(&mut hub, &hospital, ClientRole::Hospital);
        identify(&mut hub, &unit, ClientRole::FieldUnit);
        hospital.drain();
        unit.drain();

        send_chat(&mut hub, &unit, "fieldUnit", "five minutes out", None);

        let hospital_chats = hospital.drain();
        assert_eq!(chats(&hospital_chats).len(), 1);
        assert!(unit.drain().is_empty());
    }

    #[test]
    fn chat_without_timestamp_gets_one_assigned() {
        let mut hub = new_hub();
        let mut a = connect(&mut hub, "a");
        let b = connect(&mut hub, "b");
        a.drain();

        send_chat(&mut hub, &b, "fieldUnit", "no clock here", None);

        let received = a.drain();
        let events = chats(&received);
        assert_eq!(events.len(), 1);
        assert!(events[0].timestamp > 0);
        assert!(events[0].id.starts_with(&events[0].timestamp.to_string()));
    }

    #[test]
    fn empty_chat_text_is_dropped() {
        let mut hub = new_hub();
        let mut a = connect(&mut hub, "a");
        let b = connect(&mut hub, "b");
        a.drain();

        send_chat(&mut hub, &b, "fieldUnit", "   ", Some(1000));

        assert!(chats(&a.drain()).is_empty());
    }

    #[test]
    fn telemetry_is_relayed_but_never_logged() {
        let mut hub = new_hub();
        let mut hospital = connect(&mut hub, "hospital-1");
        let unit = connect(&mut hub, "unit-1");
        hospital.drain();

        hub.handle(HubEvent::Inbound {
            session_id: unit.id.clone(),
            message: ClientMessage::Ecg {
                sample: lifeline_proto::TelemetrySample {
                    sender: "fieldUnit".into(),
                    samples: vec![0.1, 5.4, 0.2],
                    timestamp: 2000,
                },
            },
        });

        let received = hospital.drain();
        assert!(received
            .iter()
            .any(|m| matches!(m, ServerMessage::Ecg { .. })));
        assert!(hub.history.is_empty(), "telemetry never touches the log");

        // A later identify therefore carries no history either.
        let mut late = connect(&mut hub, "late");
        identify(&mut hub, &late, ClientRole::Hospital);
        assert!(late
            .drain()
            .iter()
            .all(|m| !matches!(m, ServerMessage::History { .. })));
    }

    #[test]
    fn disconnect_fans_out_status_with_live_count() {
        let mut hub = new_hub();
        let hospital = connect(&mut hub, "hospital-1");
        let mut unit_a = connect(&mut hub, "unit-a");
        let mut unit_b = connect(&mut hub, "unit-b");
        identify(&mut hub, &hospital, ClientRole::Hospital);
        unit_a.drain();
        unit_b.drain();

        hub.handle(HubEvent::Disconnected {
            session_id: hospital.id.clone(),
        });

        for peer in [&mut unit_a, &mut unit_b] {
            let received = peer.drain();
            let status = received
                .iter()
                .find_map(|m| match m {
                    ServerMessage::Status {
                        message,
                        active_clients,
                    } => Some((message.clone(), *active_clients)),
                    _ => None,
                })
                .expect("status fan-out on disconnect");
            assert_eq!(status.0, "hospital disconnected");
            assert_eq!(status.1, 2);
        }
    }

    #[test]
    fn fresh_session_catches_up_on_chats_sent_while_offline() {
        // A reconnecting party comes back as a brand-new session; the
        // history snapshot is its only bridge to what it missed.
        let mut hub = new_hub();
        let hospital = connect(&mut hub, "hospital-1");
        identify(&mut hub, &hospital, ClientRole::Hospital);

        let unit = connect(&mut hub, "unit-conn-1");
        identify(&mut hub, &unit, ClientRole::FieldUnit);
        hub.handle(HubEvent::Disconnected {
            session_id: unit.id.clone(),
        });

        send_chat(&mut hub, &hospital, "doctor", "sent while you were away", Some(1000));

        let mut unit_again = connect(&mut hub, "unit-conn-2");
        identify(&mut hub, &unit_again, ClientRole::FieldUnit);

        let received = unit_again.drain();
        let snapshot = received
            .iter()
            .find_map(|m| match m {
                ServerMessage::History { messages } => Some(messages),
                _ => None,
            })
            .expect("fresh identify gets a snapshot");
        assert!(snapshot
            .iter()
            .any(|e| e.text == "sent while you were away"));
    }

    #[test]
    fn disconnect_of_unknown_session_is_silent() {
        let mut hub = new_hub();
        let mut peer = connect(&mut hub, "a");
        peer.drain();

        hub.handle(HubEvent::Disconnected {
            session_id: "ghost".into(),
        });

        assert!(peer.drain().is_empty());
    }

    #[test]
    fn per_sender_order_is_preserved_per_recipient() {
        let mut hub = new_hub();
        let mut hospital = connect(&mut hub, "hospital-1");
        let unit = connect(&mut hub, "unit-1");
        hospital.drain();

        for n in 0..5u64 {
            send_chat(&mut hub, &unit, "fieldUnit", &format!("update {n}"), Some(n));
        }

        let received = hospital.drain();
        let texts: Vec<&str> = chats(&received).iter().map(|e| e.text.as_str()).collect();
        assert_eq!(
            texts,
            ["update 0", "update 1", "update 2", "update 3", "update 4"]
        );
    }
}
