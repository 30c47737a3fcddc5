//! Payload integration test harness.
//!
//! Everything runs in-process: the "serial link" is a `tokio::io::duplex`
//! pipe, optionally wrapped in a writer that garbles chosen frames. A full
//! payload (transport loop + controller) sits on one end, and the tests
//! drive the other end as the ground station would.
//!
//!   cargo test --test integration

use std::collections::HashSet;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncWrite, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use payload_core::Message;
use payload_services::{
    ControllerConfig, Link, PayloadContext, PayloadController, TaskRegistry, Transport,
    TransportConfig,
};

mod end_to_end;
mod transport;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const PIPE_CAPACITY: usize = 1 << 16;

pub type PipeTransport = Transport<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;
pub type FaultyTransport =
    Transport<ReadHalf<DuplexStream>, FaultyWriter<WriteHalf<DuplexStream>>>;

pub fn transport_config() -> TransportConfig {
    TransportConfig {
        ack_timeout: Duration::from_millis(500),
        data_timeout: Duration::from_millis(500),
        max_retries: 3,
        max_restarts: 3,
        resend_attempts: 0,
        idle_delay: Duration::from_millis(1),
    }
}

pub fn controller_config() -> ControllerConfig {
    ControllerConfig {
        cycle_delay: Duration::from_millis(1),
        idle_after_empty_cycles: 5,
        idle_interval: Duration::from_millis(20),
        default_priority: 100,
    }
}

/// Two transports joined by a clean pipe.
pub fn transport_pair() -> (PipeTransport, PipeTransport) {
    let (a, b) = tokio::io::duplex(PIPE_CAPACITY);
    (
        Transport::new(Link::from_stream(a), transport_config()),
        Transport::new(Link::from_stream(b), transport_config()),
    )
}

/// Like [`transport_pair`], but the left side's `corrupt_writes` (0-based
/// frame indices) reach the right side with their sequence byte flipped.
pub fn faulty_pair(corrupt_writes: &[usize]) -> (FaultyTransport, PipeTransport) {
    let (a, b) = tokio::io::duplex(PIPE_CAPACITY);
    let (reader, writer) = tokio::io::split(a);
    let writer = FaultyWriter::new(writer, corrupt_writes);
    (
        Transport::new(Link::new(reader, writer), transport_config()),
        Transport::new(Link::from_stream(b), transport_config()),
    )
}

/// Garbles selected frames on their way out. Each `write_frame` is one
/// `poll_write` as long as the pipe has room.
pub struct FaultyWriter<W> {
    inner: W,
    writes: usize,
    corrupt: HashSet<usize>,
}

impl<W> FaultyWriter<W> {
    pub fn new(inner: W, corrupt: &[usize]) -> Self {
        Self {
            inner,
            writes: 0,
            corrupt: corrupt.iter().copied().collect(),
        }
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for FaultyWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let result = if this.corrupt.contains(&this.writes) {
            let mut garbled = buf.to_vec();
            garbled[0] ^= 0x55;
            Pin::new(&mut this.inner).poll_write(cx, &garbled)
        } else {
            Pin::new(&mut this.inner).poll_write(cx, buf)
        };
        if matches!(result, Poll::Ready(Ok(_))) {
            this.writes += 1;
        }
        result
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Wait up to `timeout` for one message, skipping failed attempts.
pub async fn await_message<R, W>(
    transport: &mut Transport<R, W>,
    timeout: Duration,
) -> Option<Message>
where
    R: tokio::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return None;
        }
        if let Ok(Some(message)) = transport.poll_receive(remaining).await {
            return Some(message);
        }
    }
}

/// A running payload: transport loop and controller over one end of a pipe,
/// with the ground's transport on the other.
pub struct Payload {
    pub ground: PipeTransport,
    pub ctx: PayloadContext,
    shutdown: broadcast::Sender<()>,
    transport_task: JoinHandle<anyhow::Result<()>>,
    controller_task: JoinHandle<()>,
}

impl Payload {
    pub fn spawn(registry: TaskRegistry) -> Self {
        let (ground, flight) = transport_pair();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = broadcast::channel(1);

        let controller =
            PayloadController::new(registry, controller_config(), inbound_rx, outbound_tx);
        let ctx = controller.context().clone();

        let transport_task =
            tokio::spawn(flight.run(outbound_rx, inbound_tx, shutdown.subscribe()));
        let controller_task = tokio::spawn(controller.run(shutdown.subscribe()));

        Self {
            ground,
            ctx,
            shutdown,
            transport_task,
            controller_task,
        }
    }

    pub async fn send(&mut self, message: Message) {
        self.ground.send(&message).await.expect("uplink send");
    }

    /// Send a command and wait for the next downlinked message.
    pub async fn request(&mut self, message: Message) -> Message {
        self.send(message).await;
        self.next_downlink().await.expect("reply in time")
    }

    pub async fn next_downlink(&mut self) -> Option<Message> {
        await_message(&mut self.ground, Duration::from_secs(3)).await
    }

    /// Stop both loops and wait for them to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let stopped = tokio::time::timeout(Duration::from_secs(2), async {
            let transport = self.transport_task.await;
            let controller = self.controller_task.await;
            (transport, controller)
        })
        .await
        .expect("loops stop after shutdown");
        assert!(matches!(stopped.0, Ok(Ok(()))));
        assert!(stopped.1.is_ok());
    }
}
