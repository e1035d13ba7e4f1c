//! Append-only outcome log
//!
//! Every start/stop transition and mint outcome lands here as one line.
//! Display surfaces subscribe and receive entries in append order.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Position in the log, starting at 0
    pub index: usize,
    pub message: String,
    pub at: DateTime<Utc>,
}

struct LogInner {
    entries: RwLock<Vec<LogEntry>>,
    /// Entry count, bumped on every append to wake subscribers
    len_tx: watch::Sender<usize>,
}

/// Shared handle to the log. Clones refer to the same entries.
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<LogInner>,
}

impl EventLog {
    pub fn new() -> Self {
        let (len_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(LogInner {
                entries: RwLock::new(Vec::new()),
                len_tx,
            }),
        }
    }

    /// Append a line and return its index
    pub fn append(&self, message: impl Into<String>) -> usize {
        let message = message.into();
        info!("{}", message);

        let mut entries = self
            .inner
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let index = entries.len();
        entries.push(LogEntry {
            index,
            message,
            at: Utc::now(),
        });
        // Published under the write lock so the count never goes backwards
        self.inner.len_tx.send_replace(entries.len());
        index
    }

    pub fn len(&self) -> usize {
        self.read_entries(|entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every entry appended so far
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.read_entries(|entries| entries.to_vec())
    }

    /// Messages only, in order
    pub fn messages(&self) -> Vec<String> {
        self.read_entries(|entries| entries.iter().map(|e| e.message.clone()).collect())
    }

    /// Cursor over the log starting at the first entry
    pub fn subscribe(&self) -> LogSubscription {
        LogSubscription {
            log: self.clone(),
            cursor: 0,
            len_rx: self.inner.len_tx.subscribe(),
        }
    }

    fn read_entries<T>(&self, f: impl FnOnce(&[LogEntry]) -> T) -> T {
        let entries = self
            .inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&entries)
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

/// In-order reader over an `EventLog`
pub struct LogSubscription {
    log: EventLog,
    cursor: usize,
    len_rx: watch::Receiver<usize>,
}

impl LogSubscription {
    /// Everything appended since the last read, without waiting
    pub fn drain(&mut self) -> Vec<LogEntry> {
        let cursor = self.cursor;
        let fresh = self.log.read_entries(|entries| entries[cursor.min(entries.len())..].to_vec());
        self.cursor += fresh.len();
        fresh
    }

    /// Next entry in order, waiting for one to be appended if needed
    pub async fn next(&mut self) -> Option<LogEntry> {
        loop {
            let cursor = self.cursor;
            if let Some(entry) = self.log.read_entries(|entries| entries.get(cursor).cloned()) {
                self.cursor += 1;
                return Some(entry);
            }
            if self.len_rx.changed().await.is_err() {
                return None;
            }
        }
    }

    /// Index of the next entry this subscription will yield
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn into_stream(self) -> impl Stream<Item = LogEntry> {
        stream::unfold(self, |mut sub| async move {
            let entry = sub.next().await?;
            Some((entry, sub))
        })
    }
}
