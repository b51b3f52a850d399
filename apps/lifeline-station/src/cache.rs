use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Result;
use lifeline_proto::ChatEvent;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Namespaced cache blob in the station data directory.
pub const CACHE_FILE: &str = "lifeline.chat-history.json";
/// Pre-namespacing file name, migrated once on load.
pub const LEGACY_CACHE_FILE: &str = "chat-history.json";

/// This party's locally cached chat history: an ordered ChatEvent sequence
/// persisted as one JSON blob, rewritten in full on every change. Sibling
/// views subscribe and get the new serialized sequence on each write so they
/// can re-render in full.
pub struct CacheStore {
    path: PathBuf,
    entries: Vec<ChatEvent>,
    observers: Vec<mpsc::UnboundedSender<String>>,
}

impl CacheStore {
    pub fn load(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(CACHE_FILE);
        migrate_legacy(dir, &path);

        let entries = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Vec<ChatEvent>>(&bytes) {
                Ok(entries) => entries,
                Err(error) => {
                    warn!(%error, path = %path.display(), "chat cache unparsable; starting empty");
                    Vec::new()
                }
            },
            Err(error) if error.kind() == ErrorKind::NotFound => Vec::new(),
            Err(error) => {
                warn!(%error, path = %path.display(), "chat cache unreadable; starting empty");
                Vec::new()
            }
        };

        Ok(Self {
            path,
            entries,
            observers: Vec::new(),
        })
    }

    pub fn entries(&self) -> &[ChatEvent] {
        &self.entries
    }

    /// Register an observer; it receives the full serialized sequence after
    /// every write.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(tx);
        rx
    }

    pub fn append(&mut self, event: ChatEvent) {
        self.entries.push(event);
        self.save();
    }

    /// Swap in a merged sequence (the reconciliation output).
    pub fn replace(&mut self, entries: Vec<ChatEvent>) {
        self.entries = entries;
        self.save();
    }

    fn save(&mut self) {
        let blob = match serde_json::to_string(&self.entries) {
            Ok(blob) => blob,
            Err(error) => {
                warn!(%error, "failed to serialize chat cache");
                return;
            }
        };
        if let Err(error) = std::fs::write(&self.path, &blob) {
            // In-memory entries stay authoritative; observers are still told.
            warn!(%error, path = %self.path.display(), "chat cache write failed");
        }
        self.observers.retain(|observer| observer.send(blob.clone()).is_ok());
    }
}

fn migrate_legacy(dir: &Path, path: &Path) {
    let legacy = dir.join(LEGACY_CACHE_FILE);
    if path.exists() || !legacy.exists() {
        return;
    }
    match std::fs::rename(&legacy, path) {
        Ok(()) => info!(from = %legacy.display(), to = %path.display(), "migrated legacy chat cache"),
        Err(error) => {
            warn!(%error, from = %legacy.display(), "legacy chat cache migration failed")
        }
    }
}
