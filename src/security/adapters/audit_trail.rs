//! Audit trail: a bounded ring of recent events plus an optional JSON-lines
//! file fed by a single background writer.

use crate::security::domain::{AuditEvent, AuditQuery};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

enum WriterCommand {
    Event(Box<AuditEvent>),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

struct PendingWriter {
    receiver: mpsc::UnboundedReceiver<WriterCommand>,
    path: Utf8PathBuf,
}

/// Append-only record of security decisions.
///
/// Recording never blocks on file I/O: events go to the in-memory ring and,
/// when a file is configured, onto a channel drained by the writer task
/// started with [`AuditTrail::start`]. Events recorded before the writer
/// starts are buffered and written once it does.
pub struct AuditTrail {
    recent: Mutex<VecDeque<AuditEvent>>,
    capacity: usize,
    emitted: AtomicU64,
    sender: Option<mpsc::UnboundedSender<WriterCommand>>,
    pending: Mutex<Option<PendingWriter>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl AuditTrail {
    /// Creates a trail kept only in memory.
    #[must_use]
    pub fn in_memory(capacity: usize) -> Self {
        Self::build(capacity, None)
    }

    /// Creates a trail that also appends JSON lines to `path`.
    #[must_use]
    pub fn with_file(capacity: usize, path: impl Into<Utf8PathBuf>) -> Self {
        Self::build(capacity, Some(path.into()))
    }

    fn build(capacity: usize, path: Option<Utf8PathBuf>) -> Self {
        let (sender, pending) = path.map_or((None, None), |file_path| {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                Some(tx),
                Some(PendingWriter {
                    receiver: rx,
                    path: file_path,
                }),
            )
        });
        Self {
            recent: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            emitted: AtomicU64::new(0),
            sender,
            pending: Mutex::new(pending),
            writer: Mutex::new(None),
        }
    }

    /// Records an event.
    ///
    /// The ring lock is held while the event is queued for the writer, so
    /// the file and the ring agree on order.
    pub fn record(&self, event: AuditEvent) {
        tracing::debug!(
            action = %event.action,
            principal = ?event.principal_id,
            resource = %event.resource,
            success = event.success,
            "audit event"
        );
        let mut recent = lock(&self.recent);
        if let Some(sender) = &self.sender
            && sender
                .send(WriterCommand::Event(Box::new(event.clone())))
                .is_err()
        {
            tracing::warn!("audit writer has stopped; event kept in memory only");
        }
        if recent.len() >= self.capacity {
            recent.pop_front();
        }
        recent.push_back(event);
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns matching events, most recent first.
    #[must_use]
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEvent> {
        let recent = lock(&self.recent);
        recent
            .iter()
            .rev()
            .filter(|event| query.matches(event))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Returns the number of events recorded since creation.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Spawns the file writer. Does nothing for in-memory trails or when
    /// already started.
    pub fn start(&self) {
        let Some(pending) = lock(&self.pending).take() else {
            return;
        };
        let handle = tokio::spawn(run_writer(pending.receiver, pending.path));
        *lock(&self.writer) = Some(handle);
    }

    /// Waits until every event recorded so far has been written.
    pub async fn flush(&self) {
        if lock(&self.writer).is_none() {
            return;
        }
        let Some(sender) = &self.sender else {
            return;
        };
        let (done, written) = oneshot::channel();
        if sender.send(WriterCommand::Flush(done)).is_ok() && written.await.is_err() {
            tracing::warn!("audit writer stopped before acknowledging flush");
        }
    }

    /// Drains outstanding events and joins the writer.
    pub async fn shutdown(&self) {
        let Some(handle) = lock(&self.writer).take() else {
            return;
        };
        if let Some(sender) = &self.sender
            && sender.send(WriterCommand::Shutdown).is_err()
        {
            tracing::debug!("audit writer already stopped");
        }
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "audit writer task failed");
        }
    }
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AuditTrail")
            .field("capacity", &self.capacity)
            .field("emitted", &self.emitted())
            .field("file_backed", &self.sender.is_some())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Writes events until shut down.
///
/// `Shutdown` closes the channel; commands already queued behind it are
/// still processed, so every pending event is written and every flush
/// waiter is answered before the task ends.
async fn run_writer(mut receiver: mpsc::UnboundedReceiver<WriterCommand>, path: Utf8PathBuf) {
    let mut file: Option<File> = None;
    while let Some(command) = receiver.recv().await {
        match command {
            WriterCommand::Event(event) => write_event(&mut file, &path, &event).await,
            WriterCommand::Flush(done) => {
                flush_file(&mut file, &path).await;
                if done.send(()).is_err() {
                    tracing::debug!("audit flush waiter went away");
                }
            }
            WriterCommand::Shutdown => receiver.close(),
        }
    }
    flush_file(&mut file, &path).await;
    tracing::debug!(path = %path, "audit writer stopped");
}

async fn write_event(file: &mut Option<File>, path: &Utf8Path, event: &AuditEvent) {
    let mut line = match serde_json::to_string(event) {
        Ok(encoded) => encoded,
        Err(err) => {
            tracing::error!(error = %err, "failed to encode audit event");
            return;
        }
    };
    line.push('\n');

    if file.is_none() {
        *file = open_log(path).await;
    }
    let Some(handle) = file.as_mut() else {
        return;
    };
    if let Err(err) = handle.write_all(line.as_bytes()).await {
        tracing::error!(path = %path, error = %err, "failed to append audit event");
        *file = None;
    }
}

async fn flush_file(file: &mut Option<File>, path: &Utf8Path) {
    if let Some(handle) = file.as_mut()
        && let Err(err) = handle.flush().await
    {
        tracing::error!(path = %path, error = %err, "failed to flush audit log");
    }
}

async fn open_log(path: &Utf8Path) -> Option<File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty())
        && let Err(err) = tokio::fs::create_dir_all(parent).await
    {
        tracing::error!(path = %parent, error = %err, "failed to create audit log directory");
        return None;
    }
    match OpenOptions::new().create(true).append(true).open(path).await {
        Ok(opened) => Some(opened),
        Err(err) => {
            tracing::error!(path = %path, error = %err, "failed to open audit log");
            None
        }
    }
}
