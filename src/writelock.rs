//! Process-wide write-lock flag (§9 design note).
//!
//! A single atomic boolean, set by the scheduler when it enters a maintenance window and
//! cleared when the window ends. The ingestor polls it before every frame. No mutex guards it —
//! it is the only piece of state it guards.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;

#[derive(Clone)]
pub struct WriteLock {
    locked: Arc<AtomicBool>,
    since_unix: Arc<AtomicI64>,
}

impl WriteLock {
    pub fn new() -> Self {
        Self {
            locked: Arc::new(AtomicBool::new(false)),
            since_unix: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn is_set(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    pub fn set(&self) {
        self.since_unix.store(Utc::now().timestamp(), Ordering::Release);
        self.locked.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.locked.store(false, Ordering::Release);
    }

    /// Seconds since the lock was last set, if it is currently held.
    pub fn held_duration_secs(&self) -> Option<i64> {
        if !self.is_set() {
            return None;
        }
        let since = self.since_unix.load(Ordering::Acquire);
        Some((Utc::now().timestamp() - since).max(0))
    }
}

impl Default for WriteLock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear() {
        let lock = WriteLock::new();
        assert!(!lock.is_set());
        assert_eq!(lock.held_duration_secs(), None);
    }

    #[test]
    fn set_then_clear() {
        let lock = WriteLock::new();
        lock.set();
        assert!(lock.is_set());
        assert!(lock.held_duration_secs().is_some());
        lock.clear();
        assert!(!lock.is_set());
    }
}
