use std::sync::Arc;
use tokio::sync::watch;

/// Scope-wide change counter.
///
/// Handles never touch rendering state: they bump this counter and every
/// derived value depends on [`Reload::version`]. Observers holding a
/// receiver see the latest version, so bursts of triggers coalesce.
#[derive(Clone)]
pub struct Reload {
    tx: Arc<watch::Sender<u64>>,
}

impl Reload {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_modify(|version| *version += 1);
    }

    pub fn version(&self) -> u64 {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

impl Default for Reload {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Reload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reload").field("version", &self.version()).finish()
    }
}
