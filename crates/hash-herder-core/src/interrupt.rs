use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

use crate::ledger::ProgressLedger;

#[derive(Default)]
struct InterruptState {
    cancelled: AtomicBool,
    ledgers: Mutex<Vec<Arc<ProgressLedger>>>,
}

/// Cloneable handle given to whatever listens for OS signals.
///
/// `interrupt` flushes every ledger registered by the running engine and
/// asks the engine to stop at the next file boundary.
#[derive(Clone, Default)]
pub struct InterruptHandle {
    inner: Arc<InterruptState>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, ledger: Arc<ProgressLedger>) {
        if let Ok(mut ledgers) = self.inner.ledgers.lock() {
            ledgers.push(ledger);
        }
    }

    /// Drop registered ledgers and re-arm the handle for the next run.
    pub fn clear(&self) {
        if let Ok(mut ledgers) = self.inner.ledgers.lock() {
            ledgers.clear();
        }
        self.inner.cancelled.store(false, Ordering::SeqCst);
    }

    /// Flush all open ledgers synchronously and request cancellation.
    /// Returns how many ledgers were flushed successfully.
    pub fn interrupt(&self) -> usize {
        warn!("Interrupt received, saving progress...");
        self.inner.cancelled.store(true, Ordering::SeqCst);

        let ledgers = match self.inner.ledgers.lock() {
            Ok(ledgers) => ledgers,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut flushed = 0;
        for ledger in ledgers.iter() {
            match ledger.flush() {
                Ok(()) => {
                    flushed += 1;
                    info!(
                        "Progress saved for {} ({} files processed)",
                        ledger.root().display(),
                        ledger.processed_count()
                    );
                }
                Err(e) => error!(
                    "Failed to flush progress ledger for {}: {}",
                    ledger.root().display(),
                    e
                ),
            }
        }
        flushed
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_interrupt_flushes_registered_ledgers() {
        let tmp = tempdir().unwrap();
        let root = tmp.path().join("root");
        let ledger = Arc::new(ProgressLedger::open(&root, None, false));
        ledger.mark_processed("/root/a").unwrap();

        let handle = InterruptHandle::new();
        handle.register(Arc::clone(&ledger));
        assert!(!handle.is_cancelled());

        let clone = handle.clone();
        assert_eq!(clone.interrupt(), 1);
        assert!(handle.is_cancelled());
        assert_eq!(fs::read_to_string(ledger.file_path()).unwrap(), "/root/a\n");

        handle.clear();
        assert!(!handle.is_cancelled());
        assert_eq!(handle.interrupt(), 0);
    }
}
