//! Command queue — priority-ordered pending tasks.
//!
//! Ordered by `(priority, created_at)` ascending: lower priority values are
//! served first, and tasks of equal priority leave in arrival order. A
//! per-queue enqueue counter breaks ties between identical timestamps.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::task::Task;

type Key = (u8, Instant, u64);

#[derive(Default)]
struct Inner {
    tasks: BTreeMap<Key, Task>,
    paused: bool,
    next_seq: u64,
    rejected: u64,
}

/// Shared between the controller loop and task handlers via `Arc`.
#[derive(Default)]
pub struct CommandQueue {
    inner: Mutex<Inner>,
}

/// One row of [`CommandQueue::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTask {
    pub id: u8,
    pub priority: u8,
    pub has_payload: bool,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // a panicking handler never holds this lock; the data is still valid
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a task. Returns false (and counts a rejection) while paused.
    pub fn enqueue(&self, mut task: Task) -> bool {
        let mut inner = self.lock();
        if inner.paused {
            inner.rejected += 1;
            tracing::debug!(id = task.id(), "queue paused, task dropped");
            return false;
        }
        task.stamp(Instant::now());
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.tasks.insert((task.priority(), task.created_at(), seq), task);
        true
    }

    /// Remove and return the most urgent task. None while paused or empty.
    pub fn dequeue(&self) -> Option<Task> {
        let mut inner = self.lock();
        if inner.paused {
            return None;
        }
        inner.tasks.pop_first().map(|(_, task)| task)
    }

    pub fn pause(&self) {
        self.lock().paused = true;
    }

    pub fn resume(&self) {
        self.lock().paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn is_empty(&self) -> bool {
        self.lock().tasks.is_empty()
    }

    pub fn size(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Discard every pending task without running it.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let dropped = inner.tasks.len();
        inner.tasks.clear();
        dropped
    }

    /// Tasks dropped by `enqueue` while paused.
    pub fn rejected(&self) -> u64 {
        self.lock().rejected
    }

    /// Pending tasks in dequeue order.
    pub fn snapshot(&self) -> Vec<QueuedTask> {
        self.lock()
            .tasks
            .values()
            .map(|t| QueuedTask {
                id: t.id(),
                priority: t.priority(),
                has_payload: !t.payload().is_empty(),
            })
            .collect()
    }
}
