//! Single-flight initialization
//!
//! A mutex-protected map from loader key to an in-progress marker. The first
//! caller for a key becomes the leader and runs the initialization; everyone
//! else blocks on the marker's condition variable until the leader publishes
//! an outcome or their own timeout expires.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::MetaDataError;
use crate::sync;

/// Result published by the leader of a pending initialization
#[derive(Debug, Clone)]
pub enum InitOutcome {
    Completed(std::result::Result<(), Arc<MetaDataError>>),
    Cancelled,
}

/// One in-flight initialization
#[derive(Debug)]
pub struct PendingInit {
    key: String,
    slot: Mutex<Option<InitOutcome>>,
    ready: Condvar,
    started: Instant,
}

impl PendingInit {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            slot: Mutex::new(None),
            ready: Condvar::new(),
            started: Instant::now(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }

    /// Block until an outcome is published or `timeout` passes
    pub fn wait(&self, timeout: Duration) -> Option<InitOutcome> {
        let slot = sync::lock(&self.slot);
        let (slot, _) = self
            .ready
            .wait_timeout_while(slot, timeout, |outcome| outcome.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        slot.clone()
    }

    pub fn is_done(&self) -> bool {
        sync::lock(&self.slot).is_some()
    }

    /// Publish once; later outcomes are ignored
    fn publish(&self, outcome: InitOutcome) {
        let mut slot = sync::lock(&self.slot);
        if slot.is_none() {
            *slot = Some(outcome);
        }
        self.ready.notify_all();
    }
}

/// Process-wide table of in-flight initializations, keyed by loader key
#[derive(Debug, Default)]
pub struct PendingInits {
    tasks: Mutex<HashMap<String, Arc<PendingInit>>>,
}

impl PendingInits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the in-flight task for `key`, or create it. The flag is `true`
    /// for the caller that created it and must run the initialization.
    pub fn join_or_start(&self, key: &str) -> (Arc<PendingInit>, bool) {
        let mut tasks = sync::lock(&self.tasks);
        if let Some(existing) = tasks.get(key) {
            debug!("Joining pending initialization: {}", key);
            return (Arc::clone(existing), false);
        }
        let task = Arc::new(PendingInit::new(key));
        tasks.insert(key.to_string(), Arc::clone(&task));
        (task, true)
    }

    /// Remove the entry (if it is still `task`) and wake all waiters
    pub fn finish(&self, task: &Arc<PendingInit>, outcome: InitOutcome) {
        self.abandon(task);
        task.publish(outcome);
    }

    /// Drop the entry without publishing, so a later caller starts afresh
    pub fn abandon(&self, task: &Arc<PendingInit>) -> bool {
        let mut tasks = sync::lock(&self.tasks);
        match tasks.get(task.key()) {
            Some(current) if Arc::ptr_eq(current, task) => {
                tasks.remove(task.key());
                true
            }
            _ => false,
        }
    }

    /// Cancel the in-flight task for `key`; waiters observe `Cancelled`
    pub fn cancel(&self, key: &str) -> bool {
        let removed = sync::lock(&self.tasks).remove(key);
        match removed {
            Some(task) => {
                debug!("Cancelled pending initialization: {}", key);
                task.publish(InitOutcome::Cancelled);
                true
            }
            None => false,
        }
    }

    pub fn is_in_progress(&self, key: &str) -> bool {
        sync::lock(&self.tasks).contains_key(key)
    }

    pub fn active_count(&self) -> usize {
        sync::lock(&self.tasks).len()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = sync::lock(&self.tasks).keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_first_caller_leads() {
        let pending = PendingInits::new();
        let (first, lead) = pending.join_or_start("Loader:manual:a");
        let (second, follow) = pending.join_or_start("Loader:manual:a");
        assert!(lead);
        assert!(!follow);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pending.active_count(), 1);
    }

    #[test]
    fn test_waiters_receive_outcome() {
        let pending = Arc::new(PendingInits::new());
        let (task, _) = pending.join_or_start("k");

        let waiter = {
            let task = Arc::clone(&task);
            thread::spawn(move || task.wait(Duration::from_secs(5)))
        };
        pending.finish(&task, InitOutcome::Completed(Ok(())));

        assert!(matches!(waiter.join().unwrap(), Some(InitOutcome::Completed(Ok(())))));
        assert!(!pending.is_in_progress("k"));
    }

    #[test]
    fn test_wait_times_out() {
        let pending = PendingInits::new();
        let (task, _) = pending.join_or_start("slow");
        assert!(task.wait(Duration::from_millis(10)).is_none());
        assert!(pending.abandon(&task));
        let (_, lead) = pending.join_or_start("slow");
        assert!(lead);
    }

    #[test]
    fn test_stale_finish_keeps_new_entry() {
        let pending = PendingInits::new();
        let (stale, _) = pending.join_or_start("k");
        pending.abandon(&stale);
        let (fresh, _) = pending.join_or_start("k");

        pending.finish(&stale, InitOutcome::Completed(Ok(())));
        assert!(pending.is_in_progress("k"));
        assert!(!fresh.is_done());
    }

    #[test]
    fn test_cancel_wakes_waiters() {
        let pending = PendingInits::new();
        let (task, _) = pending.join_or_start("k");
        assert!(pending.cancel("k"));
        assert!(matches!(task.wait(Duration::from_millis(10)), Some(InitOutcome::Cancelled)));
        assert!(!pending.cancel("k"));
    }
}
