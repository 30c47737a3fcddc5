//! Shared serial link helpers for CLI commands.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::time::Instant;

use payload_core::config::PayloadConfig;
use payload_core::{message_id, Message};
use payload_services::serial::{self, SerialPort};
use payload_services::{Transport, TransportConfig};

pub type CtlTransport = Transport<ReadHalf<SerialPort>, WriteHalf<SerialPort>>;

/// Global options shared by every command.
pub struct Options {
    pub device: PathBuf,
    pub baud: u32,
    pub timeout: Duration,
    pub json: bool,
    pub config: PayloadConfig,
}

pub fn open(opts: &Options) -> Result<CtlTransport> {
    let link = serial::open(&opts.device, opts.baud)
        .with_context(|| format!("failed to open {}", opts.device.display()))?;
    Ok(Transport::new(
        link,
        TransportConfig::from(&opts.config.transport),
    ))
}

/// Wait up to `timeout` for one complete message. Failed receive attempts
/// are logged and the wait continues.
pub async fn await_message(
    transport: &mut CtlTransport,
    timeout: Duration,
) -> Result<Option<Message>> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        match transport.poll_receive(remaining).await {
            Ok(Some(message)) => return Ok(Some(message)),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "receive failed"),
        }
    }
}

/// Parse an ID given as hex (`0x20`), decimal (`32`), or name
/// (`request_payload_state`).
pub fn parse_id(s: &str) -> Result<u8> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u8::from_str_radix(hex, 16).with_context(|| format!("invalid hex id {s}"));
    }
    if let Ok(id) = s.parse::<u8>() {
        return Ok(id);
    }
    let wanted = s.to_ascii_lowercase();
    message_id::ALL
        .iter()
        .copied()
        .find(|&id| message_id::name(id) == wanted)
        .with_context(|| format!("unknown message id {s}"))
}

pub fn parse_payload(s: Option<&str>) -> Result<Vec<u8>> {
    match s {
        None => Ok(Vec::new()),
        Some(s) => hex::decode(s).with_context(|| format!("payload must be hex, got {s}")),
    }
}

#[derive(Serialize)]
pub struct MessageView {
    pub message_type: u8,
    pub name: &'static str,
    pub len: usize,
    pub body: String,
}

impl From<&Message> for MessageView {
    fn from(m: &Message) -> Self {
        Self {
            message_type: m.message_type(),
            name: message_id::name(m.message_type()),
            len: m.body().len(),
            body: hex::encode(m.body()),
        }
    }
}

pub fn print_message(message: &Message, json: bool) -> Result<()> {
    let view = MessageView::from(message);
    if json {
        println!("{}", serde_json::to_string(&view)?);
    } else {
        println!(
            "0x{:02x} {:<24} {:>5} bytes  {}",
            view.message_type, view.name, view.len, view.body
        );
    }
    Ok(())
}
