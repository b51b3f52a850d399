use std::collections::HashMap;

use lifeline_proto::{ClientRole, ServerMessage};
use tokio::sync::mpsc;

/// Declared role of a live session. Starts unidentified; a later identify
/// overwrites it (session ids are per-connection, so a second identify on a
/// live session is the same party correcting itself, not a stale reconnect).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Unidentified,
    Hospital,
    FieldUnit,
}

impl Role {
    /// The single role transition. Returns true when this session was
    /// previously unidentified, i.e. this is its first identification.
    pub fn identify(&mut self, client: ClientRole) -> bool {
        let first = matches!(self, Role::Unidentified);
        *self = match client {
            ClientRole::Hospital => Role::Hospital,
            ClientRole::FieldUnit => Role::FieldUnit,
        };
        first
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Unidentified => "unidentified party",
            Role::Hospital => "hospital",
            Role::FieldUnit => "field unit",
        }
    }
}

/// One live connection: its role and the outbound channel that is the
/// session's exclusive handle on the socket. Dropping the entry closes it.
pub struct Session {
    pub role: Role,
    outbound: mpsc::UnboundedSender<ServerMessage>,
}

impl Session {
    /// Queue a message for this session. Returns false when the connection
    /// is already gone; the caller logs and moves on.
    pub fn send(&self, message: ServerMessage) -> bool {
        self.outbound.send(message).is_ok()
    }
}

/// Tracks live sessions for exactly one hub. The hub's serialized event loop
/// is the only mutator, so a plain map suffices.
#[derive(Default)]
pub struct Registry {
    sessions: HashMap<String, Session>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, session_id: String, outbound: mpsc::UnboundedSender<ServerMessage>) {
        self.sessions.insert(
            session_id,
            Session {
                role: Role::Unidentified,
                outbound,
            },
        );
    }

    /// Apply an identify to a live session. Returns `Some(first)` where
    /// `first` is true on the session's first identification, or `None` when
    /// the session is not live.
    pub fn set_role(&mut self, session_id: &str, client: ClientRole) -> Option<bool> {
        self.sessions
            .get_mut(session_id)
            .map(|session| session.role.identify(client))
    }

    /// Remove a session; no-op when already removed. Returns the departed
    /// session's role so the hub can describe it in the status fan-out.
    pub fn deregister(&mut self, session_id: &str) -> Option<Role> {
        self.sessions
            .remove(session_id)
            .map(|session| session.role)
    }

    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    /// Visit every live session except `exclude`. Iteration order is
    /// unspecified and must not be relied upon.
    pub fn each_other(&self, exclude: &str, mut f: impl FnMut(&str, &Session)) {
        for (session_id, session) in &self.sessions {
            if session_id != exclude {
                f(session_id, session);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
