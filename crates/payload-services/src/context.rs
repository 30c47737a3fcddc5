//! Controller context — the capabilities handed to every task handler.
//!
//! Cloned freely; every field is a shared handle. Handlers reach the queue,
//! the outbound channel and the published state only through here.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use payload_core::{message_id, Message, PayloadState};

use crate::command_queue::CommandQueue;
use crate::registry::TaskRegistry;
use crate::task::Task;

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("unknown message type 0x{0:02x}")]
    UnknownMessageType(u8),

    #[error("{0} is not a fault state")]
    NotAFaultState(PayloadState),

    #[error("controller is not running")]
    ControllerStopped,
}

/// Onboard time, corrected by the ground's last SYNCHRONIZE_TIME.
#[derive(Debug, Default)]
pub struct MissionClock {
    offset_secs: AtomicI64,
}

impl MissionClock {
    fn system_secs() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    /// Corrected unix time in seconds.
    pub fn now_secs(&self) -> u64 {
        let now = Self::system_secs().saturating_add(self.offset_secs.load(Ordering::Relaxed));
        now.max(0) as u64
    }

    /// Adopt `ground_secs` as the current time. Returns the new offset, or
    /// `None` (clock untouched) when the time does not fit an `i64`.
    pub fn synchronize(&self, ground_secs: u64) -> Option<i64> {
        let offset = i64::try_from(ground_secs)
            .ok()?
            .checked_sub(Self::system_secs())?;
        self.offset_secs.store(offset, Ordering::Relaxed);
        Some(offset)
    }

    pub fn offset_secs(&self) -> i64 {
        self.offset_secs.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct PayloadContext {
    queue: Arc<CommandQueue>,
    registry: Arc<TaskRegistry>,
    outbound_tx: mpsc::UnboundedSender<Message>,
    state_rx: watch::Receiver<PayloadState>,
    faults_tx: mpsc::UnboundedSender<PayloadState>,
    clock: Arc<MissionClock>,
    default_priority: u8,
}

impl PayloadContext {
    pub(crate) fn new(
        queue: Arc<CommandQueue>,
        registry: Arc<TaskRegistry>,
        outbound_tx: mpsc::UnboundedSender<Message>,
        state_rx: watch::Receiver<PayloadState>,
        faults_tx: mpsc::UnboundedSender<PayloadState>,
        default_priority: u8,
    ) -> Self {
        Self {
            queue,
            registry,
            outbound_tx,
            state_rx,
            faults_tx,
            clock: Arc::new(MissionClock::default()),
            default_priority,
        }
    }

    /// Queue the handler registered for `id`. `priority` overrides the
    /// registered one. Returns whether the queue accepted the task (false
    /// while paused).
    pub fn enqueue_task(
        &self,
        id: u8,
        payload: Bytes,
        priority: Option<u8>,
    ) -> Result<bool, ControllerError> {
        let handler = self
            .registry
            .lookup(id)
            .ok_or(ControllerError::UnknownMessageType(id))?;
        let priority = priority
            .or_else(|| self.registry.priority(id))
            .unwrap_or(self.default_priority);
        let accepted = self.queue.enqueue(Task::new(id, priority, payload, handler));
        if accepted {
            tracing::debug!(id, name = message_id::name(id), priority, "task queued");
        }
        Ok(accepted)
    }

    /// Hand a message to the transport loop. False once the transport is gone.
    pub fn enqueue_outbound(&self, message: Message) -> bool {
        let message_type = message.message_type();
        if self.outbound_tx.send(message).is_err() {
            tracing::warn!(
                message_type,
                name = message_id::name(message_type),
                "outbound queue closed, message dropped"
            );
            return false;
        }
        true
    }

    /// Last state published by the controller.
    pub fn current_state(&self) -> PayloadState {
        *self.state_rx.borrow()
    }

    /// Ask the controller to enter a fault state on its next cycle.
    pub fn signal_fault(&self, state: PayloadState) -> Result<(), ControllerError> {
        if !state.is_fault() {
            return Err(ControllerError::NotAFaultState(state));
        }
        tracing::warn!(state = %state, "fault signalled");
        self.faults_tx
            .send(state)
            .map_err(|_| ControllerError::ControllerStopped)
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn clock(&self) -> &MissionClock {
        &self.clock
    }
}
