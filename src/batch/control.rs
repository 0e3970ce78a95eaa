use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::Serialize;

/// Cooperative cancellation flag, checked between protocol steps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Shared counters of a running batch. Clones observe the same batch.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    total: AtomicUsize,
    completed: AtomicUsize,
    verified: AtomicUsize,
    failed: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub completed: usize,
    pub verified: usize,
    pub failed: usize,
}

impl ProgressSnapshot {
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.completed)
    }
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.inner.total.load(Ordering::SeqCst),
            completed: self.inner.completed.load(Ordering::SeqCst),
            verified: self.inner.verified.load(Ordering::SeqCst),
            failed: self.inner.failed.load(Ordering::SeqCst),
        }
    }

    pub(crate) fn start(&self, total: usize) {
        self.inner.total.store(total, Ordering::SeqCst);
        self.inner.completed.store(0, Ordering::SeqCst);
        self.inner.verified.store(0, Ordering::SeqCst);
        self.inner.failed.store(0, Ordering::SeqCst);
    }

    /// `success` counts towards `verified`, everything else towards `failed`.
    pub(crate) fn record(&self, success: bool) {
        if success {
            self.inner.verified.fetch_add(1, Ordering::SeqCst);
        } else {
            self.inner.failed.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.completed.fetch_add(1, Ordering::SeqCst);
    }
}
