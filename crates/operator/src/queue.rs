use std::collections::HashSet;
use std::sync::Mutex;

#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;

/// Hands job keys to the reconciliation workers.
#[cfg_attr(test, automock)]
pub trait WorkQueue: Send + Sync {
    /// Queues `key`. Adding a key that is already waiting is a no-op.
    fn add(&self, key: String);
}

#[derive(Default)]
struct QueueState {
    /// Keys that need a reconciliation pass.
    dirty: HashSet<String>,
    /// Keys a worker has taken and not yet marked done.
    processing: HashSet<String>,
}

/// Unbounded FIFO of keys.
///
/// A key is handed to at most one worker at a time. Adding a key while a
/// worker holds it marks it dirty; it is queued again when the worker calls
/// [`KeyQueue::done`].
pub struct KeyQueue {
    state: Mutex<QueueState>,
    tx: mpsc::UnboundedSender<String>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
}

impl KeyQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            state: Mutex::new(QueueState::default()),
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Waits for the next key. The caller owns it until [`KeyQueue::done`].
    pub async fn next(&self) -> Option<String> {
        let key = self.rx.lock().await.recv().await?;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.dirty.remove(&key);
        state.processing.insert(key.clone());
        Some(key)
    }

    /// Releases `key`, re-queueing it if it was added while held.
    pub fn done(&self, key: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.processing.remove(key);
        if state.dirty.contains(key) {
            // The receiver lives as long as `self`.
            let _ = self.tx.send(key.to_string());
        }
    }

    /// Number of keys waiting for a pass, including ones held by a worker.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).dirty.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for KeyQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue for KeyQueue {
    fn add(&self, key: String) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.dirty.insert(key.clone()) {
            return;
        }
        if state.processing.contains(&key) {
            return;
        }
        let _ = self.tx.send(key);
    }
}
