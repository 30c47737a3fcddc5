//! payloadd — payload command-and-control daemon.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::Instrument;

use payload_core::config::PayloadConfig;
use payload_core::Message;
use payload_services::{
    serial, ControllerConfig, PayloadController, TaskRegistry, Transport, TransportConfig,
};

const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = PayloadConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = PayloadConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        PayloadConfig::default()
    });

    // A device path on the command line wins over config and environment.
    if let Some(device) = std::env::args().nth(1) {
        config.link.device = PathBuf::from(device);
    }
    tracing::info!(
        device = %config.link.device.display(),
        baud = config.link.baud_rate,
        "payloadd starting"
    );

    let link = serial::open(&config.link.device, config.link.baud_rate)
        .with_context(|| format!("failed to open {}", config.link.device.display()))?;

    // Inbound: transport → controller. Outbound: task replies → transport.
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Message>();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Message>();

    let registry = TaskRegistry::with_builtins();
    tracing::info!(handlers = registry.ids().len(), "task registry ready");

    let controller = PayloadController::new(
        registry,
        ControllerConfig::from(&config.controller),
        inbound_rx,
        outbound_tx,
    );
    let mut state_rx = controller.subscribe();
    let ctx = controller.context().clone();

    let transport = Transport::new(link, TransportConfig::from(&config.transport));

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let transport_task = tokio::spawn(
        transport
            .run(outbound_rx, inbound_tx, shutdown_tx.subscribe())
            .instrument(tracing::info_span!("transport")),
    );

    let controller_task = tokio::spawn(
        controller
            .run(shutdown_tx.subscribe())
            .instrument(tracing::info_span!("controller")),
    );

    let state_logger = tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = *state_rx.borrow_and_update();
            tracing::debug!(state = %state, "state published");
        }
    });

    let snapshot_printer = tokio::spawn(async move {
        let mut interval = tokio::time::interval(SNAPSHOT_INTERVAL);
        loop {
            interval.tick().await;
            let queue = ctx.queue();
            tracing::info!(
                state = %ctx.current_state(),
                pending = queue.size(),
                paused = queue.is_paused(),
                rejected = queue.rejected(),
                clock_offset_secs = ctx.clock().offset_secs(),
                "payload snapshot"
            );
            for task in queue.snapshot() {
                tracing::info!(
                    id = task.id,
                    name = payload_core::message_id::name(task.id),
                    priority = task.priority,
                    has_payload = task.has_payload,
                    "  queued"
                );
            }
        }
    });

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv()  => tracing::info!("shutting down"),
        r = transport_task      => tracing::error!("transport loop exited: {:?}", r),
        r = controller_task     => tracing::error!("controller loop exited: {:?}", r),
        r = state_logger        => tracing::error!("state logger exited: {:?}", r),
        r = snapshot_printer    => tracing::error!("snapshot printer exited: {:?}", r),
    }

    Ok(())
}
