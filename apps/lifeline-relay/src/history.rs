use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use lifeline_proto::ChatEvent;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// The log keeps at most this many chat events; older ones are evicted FIFO.
pub const MAX_HISTORY: usize = 500;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("chat history io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("chat history blob is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Append-only capped log of chat events. The in-memory sequence is
/// authoritative; a single writer task rewrites the durable blob in full
/// after every append, strictly in order, so the latest write always wins
/// and a lagging disk never blocks delivery.
pub struct HistoryLog {
    entries: VecDeque<ChatEvent>,
    persist: Option<mpsc::UnboundedSender<String>>,
}

impl HistoryLog {
    /// Read the durable blob once at startup and arm the writer task.
    /// An absent file starts an empty log; an unreadable one is logged and
    /// discarded rather than aborting.
    pub async fn load(path: PathBuf) -> Self {
        let entries = read_entries(&path).await;
        if !entries.is_empty() {
            info!(count = entries.len(), path = %path.display(), "loaded chat history");
        }
        Self::with_persistence(entries, Some(spawn_writer(path)))
    }

    /// A log with no durable backing. Used by tests.
    #[cfg(test)]
    pub fn empty() -> Self {
        Self::with_persistence(Vec::new(), None)
    }

    fn with_persistence(
        entries: Vec<ChatEvent>,
        persist: Option<mpsc::UnboundedSender<String>>,
    ) -> Self {
        let mut entries: VecDeque<ChatEvent> = entries.into();
        while entries.len() > MAX_HISTORY {
            entries.pop_front();
        }
        Self { entries, persist }
    }

    /// Append one event, evict past the cap, then queue a full rewrite of
    /// the durable blob. A write failure never rolls back the append.
    pub fn append(&mut self, event: ChatEvent) {
        self.entries.push_back(event);
        while self.entries.len() > MAX_HISTORY {
            self.entries.pop_front();
        }
        self.flush();
    }

    /// The last `min(limit, len)` events in insertion order. Pure.
    pub fn recent(&self, limit: usize) -> Vec<ChatEvent> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn flush(&self) {
        let Some(persist) = &self.persist else {
            return;
        };
        match serde_json::to_string(&self.entries) {
            Ok(blob) => {
                if persist.send(blob).is_err() {
                    warn!("history writer task is gone; serving from memory only");
                }
            }
            Err(error) => warn!(%error, "failed to serialize chat history"),
        }
    }
}

async fn read_entries(path: &Path) -> Vec<ChatEvent> {
    match try_read_entries(path).await {
        Ok(Some(entries)) => entries,
        // An absent blob is the normal first run, not an error.
        Ok(None) => Vec::new(),
        Err(error) => {
            warn!(%error, path = %path.display(), "chat history unreadable; starting empty");
            Vec::new()
        }
    }
}

async fn try_read_entries(path: &Path) -> Result<Option<Vec<ChatEvent>>, HistoryError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error.into()),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// One writer task per log. Blobs are processed in send order and never
/// concurrently, so a partial or interleaved write cannot occur.
fn spawn_writer(path: PathBuf) -> mpsc::UnboundedSender<String> {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        while let Some(blob) = rx.recv().await {
            if let Err(error) = write_blob(&path, &blob).await {
                warn!(%error, path = %path.display(), "chat history write failed; serving from memory");
            }
        }
    });
    tx
}

async fn write_blob(path: &Path, blob: &str) -> Result<(), HistoryError> {
    tokio::fs::write(path, blob).await?;
    Ok(())
}
