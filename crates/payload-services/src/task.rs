//! Task — one queued unit of work bound to its handler.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;

use payload_core::Message;

use crate::context::PayloadContext;
use crate::registry::TaskHandler;

/// Attempts per task before it is given up.
pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("task 0x{id:02x} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        id: u8,
        attempts: u32,
        last_error: String,
    },
}

pub struct Task {
    id: u8,
    priority: u8,
    payload: Bytes,
    attempts: u32,
    created_at: Instant,
    handler: Arc<dyn TaskHandler>,
}

impl Task {
    pub fn new(id: u8, priority: u8, payload: Bytes, handler: Arc<dyn TaskHandler>) -> Self {
        Self {
            id,
            priority,
            payload,
            attempts: 0,
            created_at: Instant::now(),
            handler,
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub(crate) fn stamp(&mut self, at: Instant) {
        self.created_at = at;
    }

    /// One handler call. A panic counts as a failed attempt.
    fn attempt(&self, ctx: &PayloadContext) -> anyhow::Result<Option<Message>> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.handler.handle(ctx, &self.payload))) {
            Ok(result) => result,
            Err(cause) => {
                let reason = cause
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| cause.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(anyhow::anyhow!("handler panicked: {reason}"))
            }
        }
    }

    /// Run the handler, retrying immediately on failure until
    /// [`MAX_ATTEMPTS`] attempts have been made. Blocking; runs on the
    /// controller's worker thread.
    pub fn execute(&mut self, ctx: &PayloadContext) -> Result<Option<Message>, TaskError> {
        loop {
            self.attempts += 1;
            match self.attempt(ctx) {
                Ok(output) => {
                    tracing::debug!(id = self.id, attempts = self.attempts, "task completed");
                    return Ok(output);
                }
                Err(e) if self.attempts < MAX_ATTEMPTS => {
                    tracing::debug!(
                        id = self.id,
                        attempt = self.attempts,
                        error = %e,
                        "task attempt failed, retrying"
                    );
                }
                Err(e) => {
                    return Err(TaskError::RetriesExhausted {
                        id: self.id,
                        attempts: self.attempts,
                        last_error: format!("{e:#}"),
                    })
                }
            }
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("payload", &hex::encode(&self.payload))
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::context::tests::test_context;
    use crate::registry::handler_fn;

    pub(crate) fn noop_task(id: u8, priority: u8) -> Task {
        Task::new(
            id,
            priority,
            Bytes::new(),
            Arc::new(handler_fn(|_, _| Ok(None))),
        )
    }

    #[test]
    fn always_failing_handler_runs_exactly_three_times() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut task = Task::new(
            0x42,
            10,
            Bytes::from_static(b"x"),
            Arc::new(handler_fn(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("sensor offline")
            })),
        );

        let (ctx, _outbound) = test_context();
        let err = task.execute(&ctx).unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(task.attempts(), 3);
        match err {
            TaskError::RetriesExhausted {
                id,
                attempts,
                last_error,
            } => {
                assert_eq!((id, attempts), (0x42, 3));
                assert!(last_error.contains("sensor offline"));
            }
        }
    }

    #[test]
    fn panicking_handler_counts_as_failed_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut task = Task::new(
            0x43,
            10,
            Bytes::new(),
            Arc::new(handler_fn(move |_, payload| {
                counter.fetch_add(1, Ordering::SeqCst);
                // out-of-bounds index on an empty payload
                Ok(Some(Message::new(0x80, vec![payload[7]])?))
            })),
        );

        let (ctx, _outbound) = test_context();
        let err = task.execute(&ctx).unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let TaskError::RetriesExhausted { last_error, .. } = err;
        assert!(last_error.contains("handler panicked"), "{last_error}");
    }

    #[test]
    fn success_on_final_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut task = Task::new(
            1,
            10,
            Bytes::new(),
            Arc::new(handler_fn(move |_, _| {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    anyhow::bail!("flaky");
                }
                Ok(Some(Message::empty(0x80)))
            })),
        );

        let (ctx, _outbound) = test_context();
        let reply = task.execute(&ctx).unwrap();
        assert_eq!(reply.map(|m| m.message_type()), Some(0x80));
        assert_eq!(task.attempts(), 3);
    }

    #[test]
    fn handler_sees_payload() {
        let mut task = Task::new(
            1,
            10,
            Bytes::from_static(&[1, 2, 3]),
            Arc::new(handler_fn(|_, payload| {
                Ok(Some(Message::new(0x82, payload.to_vec())?))
            })),
        );
        let (ctx, _outbound) = test_context();
        let reply = task.execute(&ctx).unwrap().unwrap();
        assert_eq!(reply.body().as_ref(), &[1, 2, 3]);
        assert_eq!(task.attempts(), 1);
    }
}
