//! [`UnitOfWork`]: post-commit hook registry for a transaction boundary.
//!
//! The record store owns atomicity. A unit of work only tells the encryption
//! layer that a transaction is open, and collects callbacks the caller's
//! transaction boundary runs once the store has committed.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

type Callback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Active,
    Committed,
    RolledBack,
}

struct State {
    phase: Phase,
    callbacks: Vec<Callback>,
    keys: HashSet<usize>,
}

/// Handle to an open transaction scope.
///
/// Cheap to clone; all clones refer to the same scope.
#[derive(Clone)]
pub struct UnitOfWork {
    inner: Arc<Mutex<State>>,
}

impl UnitOfWork {
    /// Open a new, active unit of work.
    pub fn begin() -> Self {
        Self {
            inner: Arc::new(Mutex::new(State {
                phase: Phase::Active,
                callbacks: Vec::new(),
                keys: HashSet::new(),
            })),
        }
    }

    /// Returns `true` until [`commit`](Self::commit) or [`rollback`](Self::rollback) is called.
    pub fn is_active(&self) -> bool {
        self.inner.lock().phase == Phase::Active
    }

    /// Number of callbacks waiting for commit.
    pub fn pending(&self) -> usize {
        self.inner.lock().callbacks.len()
    }

    /// Register `callback` to run after a successful commit.
    ///
    /// If the scope already committed the callback runs immediately; if it was
    /// rolled back the callback is dropped.
    pub fn on_commit(&self, callback: impl FnOnce() + Send + 'static) {
        let mut state = self.inner.lock();
        match state.phase {
            Phase::Active => state.callbacks.push(Box::new(callback)),
            Phase::Committed => {
                drop(state);
                callback();
            }
            Phase::RolledBack => {}
        }
    }

    /// Register `callback` under `key` unless a callback with the same key is
    /// already waiting for commit. Returns `true` if `callback` was accepted.
    ///
    /// Keys are forgotten once the scope finishes.
    pub fn on_commit_once(&self, key: usize, callback: impl FnOnce() + Send + 'static) -> bool {
        let mut state = self.inner.lock();
        match state.phase {
            Phase::Active => {
                if !state.keys.insert(key) {
                    return false;
                }
                state.callbacks.push(Box::new(callback));
                true
            }
            Phase::Committed => {
                drop(state);
                callback();
                true
            }
            Phase::RolledBack => false,
        }
    }

    /// Returns `true` if a callback registered under `key` is waiting for commit.
    pub fn is_pending(&self, key: usize) -> bool {
        let state = self.inner.lock();
        state.phase == Phase::Active && state.keys.contains(&key)
    }

    /// Mark the scope committed and run every registered callback in
    /// registration order. Returns the number of callbacks run.
    ///
    /// Calling `commit` on a finished scope is a no-op.
    pub fn commit(&self) -> usize {
        let callbacks = {
            let mut state = self.inner.lock();
            if state.phase != Phase::Active {
                return 0;
            }
            state.phase = Phase::Committed;
            state.keys.clear();
            std::mem::take(&mut state.callbacks)
        };
        // Run outside the lock: a callback may register further callbacks.
        let count = callbacks.len();
        for callback in callbacks {
            callback();
        }
        count
    }

    /// Mark the scope rolled back and discard every registered callback.
    pub fn rollback(&self) {
        let mut state = self.inner.lock();
        if state.phase == Phase::Active {
            state.phase = Phase::RolledBack;
            state.callbacks.clear();
            state.keys.clear();
        }
    }
}

impl Default for UnitOfWork {
    fn default() -> Self {
        Self::begin()
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("UnitOfWork")
            .field("phase", &state.phase)
            .field("pending", &state.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn commit_runs_callbacks_in_order() {
        let uow = UnitOfWork::begin();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            uow.on_commit(move || log.lock().push(i));
        }
        assert_eq!(uow.pending(), 3);
        assert_eq!(uow.commit(), 3);
        assert_eq!(*log.lock(), vec![0, 1, 2]);
        assert!(!uow.is_active());
    }

    #[test]
    fn rollback_discards_callbacks() {
        let uow = UnitOfWork::begin();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        uow.on_commit(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        uow.rollback();
        assert_eq!(uow.commit(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn callback_after_commit_runs_inline() {
        let uow = UnitOfWork::begin();
        uow.commit();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        uow.on_commit(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn keyed_callback_registers_once() {
        let uow = UnitOfWork::begin();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let h = hits.clone();
            uow.on_commit_once(7, move || {
                h.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(uow.is_pending(7));
        assert!(!uow.is_pending(8));
        assert_eq!(uow.pending(), 1);
        assert_eq!(uow.commit(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!uow.is_pending(7));
    }

    #[test]
    fn keyed_callback_dropped_on_rollback() {
        let uow = UnitOfWork::begin();
        assert!(uow.on_commit_once(1, || {}));
        uow.rollback();
        assert!(!uow.is_pending(1));
        assert!(!uow.on_commit_once(1, || {}));
    }

    #[test]
    fn callback_may_register_more_work() {
        let uow = UnitOfWork::begin();
        let hits = Arc::new(AtomicUsize::new(0));
        let (u, h) = (uow.clone(), hits.clone());
        uow.on_commit(move || {
            let h2 = h.clone();
            u.on_commit(move || {
                h2.fetch_add(1, Ordering::SeqCst);
            });
            h.fetch_add(1, Ordering::SeqCst);
        });
        uow.commit();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
