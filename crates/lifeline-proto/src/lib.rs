//! Wire protocol shared by the Lifeline relay and stations.
//!
//! Everything on the wire is a JSON object whose `type` field selects the
//! variant; field names are camelCase to match the browser-facing consumers.

use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declared category of a connected party.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ClientRole {
    Hospital,
    FieldUnit,
}

impl ClientRole {
    /// Label used on the wire and as the default `sender` for this party.
    pub fn label(&self) -> &'static str {
        match self {
            ClientRole::Hospital => "hospital",
            ClientRole::FieldUnit => "fieldUnit",
        }
    }
}

/// One timestamped chat message. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatEvent {
    pub sender: String,
    pub text: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Unique enough to tell apart identical-timestamp events; not global.
    pub id: String,
}

impl ChatEvent {
    /// Build an event, assigning the current time when the producer
    /// supplied no timestamp.
    pub fn new(sender: impl Into<String>, text: impl Into<String>, timestamp: Option<u64>) -> Self {
        let timestamp = timestamp.unwrap_or_else(now_ms);
        Self {
            sender: sender.into(),
            text: text.into(),
            timestamp,
            id: mint_event_id(timestamp),
        }
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            sender: self.sender.clone(),
            timestamp: self.timestamp,
            text: self.text.clone(),
        }
    }
}

/// Identity of a chat event across independently maintained stores.
/// Two events with the same key are the same event; their `id`s may differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub sender: String,
    pub timestamp: u64,
    pub text: String,
}

/// An ECG-style batch of readings. Relayed, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySample {
    pub sender: String,
    pub samples: Vec<f64>,
    pub timestamp: u64,
}

/// Periodic patient vitals. Relayed, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VitalsReading {
    pub sender: String,
    pub hr: u32,
    pub spo2: f64,
    pub systolic: u32,
    pub diastolic: u32,
    pub temp: f64,
    pub timestamp: u64,
}

/// Field-unit position fix. Relayed, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationFix {
    pub sender: String,
    pub lat: f64,
    pub lon: f64,
    pub eta_seconds: u64,
    pub timestamp: u64,
}

/// Messages sent from a station to the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Declare this connection's role.
    Identify { client_type: ClientRole },
    /// A chat line; the relay assigns a timestamp when absent.
    Chat {
        sender: String,
        text: String,
        #[serde(default)]
        timestamp: Option<u64>,
    },
    /// ECG batch, fan-out only.
    Ecg {
        #[serde(flatten)]
        sample: TelemetrySample,
    },
    /// Vitals reading, fan-out only.
    Vitals {
        #[serde(flatten)]
        reading: VitalsReading,
    },
    /// Position fix, fan-out only.
    Location {
        #[serde(flatten)]
        fix: LocationFix,
    },
    /// Advisory typing indicator; no state is kept anywhere.
    Typing { sender: String, is_typing: bool },
}

/// Messages sent from the relay to a station.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Informational greeting on accept.
    Connected {
        message: String,
        client_id: String,
        active_clients: usize,
    },
    /// Confirms an identify, addressed only to that session.
    Identified {
        client_id: String,
        client_type: ClientRole,
    },
    /// Recent-history snapshot, sent once per identification when non-empty.
    History { messages: Vec<ChatEvent> },
    /// Relayed chat event.
    Chat {
        #[serde(flatten)]
        event: ChatEvent,
    },
    /// Relayed ECG batch.
    Ecg {
        #[serde(flatten)]
        sample: TelemetrySample,
    },
    /// Relayed vitals reading.
    Vitals {
        #[serde(flatten)]
        reading: VitalsReading,
    },
    /// Relayed position fix.
    Location {
        #[serde(flatten)]
        fix: LocationFix,
    },
    /// Relayed typing indicator.
    Typing { sender: String, is_typing: bool },
    /// Sent to the remaining parties when any party disconnects.
    Status {
        message: String,
        active_clients: usize,
    },
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Generate a session id for one connection's lifetime. Never reused.
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Mint a chat-event id: the timestamp plus a short random suffix so
/// identical-timestamp events stay distinguishable.
pub fn mint_event_id(timestamp: u64) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(4)
        .map(char::from)
        .collect();
    format!("{timestamp}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_parses_camel_case_fields() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"identify","clientType":"fieldUnit"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Identify {
                client_type: ClientRole::FieldUnit
            }
        );
    }

    #[test]
    fn unknown_type_fails_to_parse() {
        let result =
            serde_json::from_str::<ClientMessage>(r#"{"type":"selfDestruct","sender":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn chat_timestamp_is_optional_inbound() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"chat","sender":"doctor","text":"status?"}"#).unwrap();
        match msg {
            ClientMessage::Chat { timestamp, .. } => assert_eq!(timestamp, None),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn relayed_chat_flattens_event_fields() {
        let event = ChatEvent {
            sender: "doctor".into(),
            text: "status?".into(),
            timestamp: 1000,
            id: "1000-ab12".into(),
        };
        let json = serde_json::to_value(ServerMessage::Chat { event }).unwrap();
        assert_eq!(json["type"], "chat");
        assert_eq!(json["sender"], "doctor");
        assert_eq!(json["timestamp"], 1000);
        assert_eq!(json["id"], "1000-ab12");
    }

    #[test]
    fn status_uses_camel_case_on_the_wire() {
        let json = serde_json::to_value(ServerMessage::Status {
            message: "hospital disconnected".into(),
            active_clients: 2,
        })
        .unwrap();
        assert_eq!(json["activeClients"], 2);
    }

    #[test]
    fn dedup_key_ignores_id() {
        let a = ChatEvent::new("doctor", "status?", Some(1000));
        let b = ChatEvent::new("doctor", "status?", Some(1000));
        assert_ne!(a.id, b.id, "suffixes should differ in practice");
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn minted_ids_carry_the_timestamp_prefix() {
        let id = mint_event_id(12345);
        assert!(id.starts_with("12345-"));
        assert_eq!(id.len(), "12345-".len() + 4);
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(generate_session_id(), generate_session_id());
    }
}
