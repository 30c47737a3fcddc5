//! Payload controller — mission state machine and task dispatch.
//!
//! STARTUP runs the startup hooks once and moves to NOMINAL. NOMINAL
//! dispatches one task at a time to a blocking worker; after
//! `idle_after_empty_cycles` empty dequeues in a row it drops to IDLE. IDLE
//! sleeps and returns to NOMINAL as soon as work is queued. Fault states
//! are entered only through [`PayloadContext::signal_fault`] and held.
//!
//! The controller is the only writer of the published state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use payload_core::config::ControllerSettings;
use payload_core::{message_id, Message, PayloadState};

use crate::command_queue::CommandQueue;
use crate::context::{ControllerError, PayloadContext};
use crate::handlers;
use crate::registry::TaskRegistry;
use crate::task::Task;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub cycle_delay: Duration,
    pub idle_after_empty_cycles: u32,
    pub idle_interval: Duration,
    pub default_priority: u8,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from(&ControllerSettings::default())
    }
}

impl From<&ControllerSettings> for ControllerConfig {
    fn from(s: &ControllerSettings) -> Self {
        Self {
            cycle_delay: s.cycle_delay(),
            idle_after_empty_cycles: s.idle_after_empty_cycles,
            idle_interval: s.idle_interval(),
            default_priority: s.default_priority,
        }
    }
}

/// Hooks run once on the STARTUP → NOMINAL transition. A failing hook is
/// logged; the transition still happens.
pub trait StartupHooks: Send {
    fn health_check(&mut self, _ctx: &PayloadContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn retrieve_internal_state(&mut self, _ctx: &PayloadContext) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct NoopStartup;

impl StartupHooks for NoopStartup {}

pub struct PayloadController {
    state: PayloadState,
    state_tx: watch::Sender<PayloadState>,
    queue: Arc<CommandQueue>,
    ctx: PayloadContext,
    inbound_rx: mpsc::UnboundedReceiver<Message>,
    faults_rx: mpsc::UnboundedReceiver<PayloadState>,
    worker: Option<JoinHandle<()>>,
    empty_cycles: u32,
    config: ControllerConfig,
    hooks: Box<dyn StartupHooks>,
}

impl PayloadController {
    /// `inbound_rx` carries messages from the transport; replies go out on
    /// `outbound_tx`.
    pub fn new(
        registry: TaskRegistry,
        config: ControllerConfig,
        inbound_rx: mpsc::UnboundedReceiver<Message>,
        outbound_tx: mpsc::UnboundedSender<Message>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(PayloadState::Startup);
        let (faults_tx, faults_rx) = mpsc::unbounded_channel();
        let queue = Arc::new(CommandQueue::new());
        let ctx = PayloadContext::new(
            queue.clone(),
            Arc::new(registry),
            outbound_tx,
            state_rx,
            faults_tx,
            config.default_priority,
        );
        Self {
            state: PayloadState::Startup,
            state_tx,
            queue,
            ctx,
            inbound_rx,
            faults_rx,
            worker: None,
            empty_cycles: 0,
            config,
            hooks: Box::new(NoopStartup),
        }
    }

    pub fn with_startup_hooks(mut self, hooks: impl StartupHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn context(&self) -> &PayloadContext {
        &self.ctx
    }

    pub fn state(&self) -> PayloadState {
        self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<PayloadState> {
        self.state_tx.subscribe()
    }

    pub fn empty_cycles(&self) -> u32 {
        self.empty_cycles
    }

    /// True while a dispatched task is still running.
    pub fn worker_busy(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn transition(&mut self, to: PayloadState) {
        if self.state == to {
            return;
        }
        tracing::info!(from = %self.state, to = %to, "state transition");
        self.state = to;
        self.state_tx.send_replace(to);
    }

    fn apply_faults(&mut self) {
        while let Ok(fault) = self.faults_rx.try_recv() {
            self.transition(fault);
        }
    }

    /// Turn every pending inbound message into a queued task.
    fn ingest(&mut self) {
        while let Ok(message) = self.inbound_rx.try_recv() {
            let id = message.message_type();
            match self.ctx.enqueue_task(id, message.into_body(), None) {
                Ok(true) => {}
                Ok(false) => tracing::warn!(id, name = message_id::name(id), "queue paused, command dropped"),
                Err(e @ ControllerError::UnknownMessageType(_)) => {
                    tracing::warn!(error = %e, "command dropped")
                }
                Err(e) => tracing::warn!(id, error = %e, "command not queued"),
            }
        }
    }

    fn startup(&mut self) {
        if let Err(e) = self.hooks.health_check(&self.ctx) {
            tracing::warn!(error = %e, "startup health check failed");
        }
        if let Err(e) = self.hooks.retrieve_internal_state(&self.ctx) {
            tracing::warn!(error = %e, "internal state retrieval failed");
        }
        self.transition(PayloadState::Nominal);
    }

    async fn dispatch(&mut self) {
        if self.worker_busy() {
            return;
        }
        if let Some(handle) = self.worker.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "task worker panicked");
            }
        }

        match self.queue.dequeue() {
            Some(task) => {
                self.empty_cycles = 0;
                self.worker = Some(spawn_worker(task, self.ctx.clone()));
            }
            None => {
                self.empty_cycles += 1;
                if self.empty_cycles >= self.config.idle_after_empty_cycles {
                    self.transition(PayloadState::Idle);
                }
            }
        }
    }

    /// One controller cycle.
    pub async fn step(&mut self) {
        self.apply_faults();
        self.ingest();

        match self.state {
            PayloadState::Startup => self.startup(),
            PayloadState::Nominal => {
                self.dispatch().await;
                tokio::time::sleep(self.config.cycle_delay).await;
            }
            PayloadState::Idle => {
                tokio::time::sleep(self.config.idle_interval).await;
                self.apply_faults();
                self.ingest();
                if self.state == PayloadState::Idle && !self.queue.is_empty() {
                    self.empty_cycles = 0;
                    self.transition(PayloadState::Nominal);
                }
            }
            PayloadState::LowPower | PayloadState::SafeMode | PayloadState::Critical => {
                tokio::time::sleep(self.config.idle_interval).await;
            }
        }
    }

    /// Runs until `shutdown` fires. A task already on the worker is left to
    /// finish on its own.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!("controller loop started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!(state = %self.state, pending = self.queue.size(), "controller loop shutting down");
                    return;
                }
                _ = self.step() => {}
            }
        }
    }
}

fn spawn_worker(mut task: Task, ctx: PayloadContext) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let id = task.id();
        let span = tracing::info_span!("task", id, name = message_id::name(id));
        let _enter = span.enter();

        match task.execute(&ctx) {
            Ok(Some(reply)) => {
                ctx.enqueue_outbound(reply);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "task failed");
                ctx.enqueue_outbound(handlers::task_failed(id, &e.to_string()));
            }
        }
    })
}
