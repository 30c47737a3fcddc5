//! Uplink commands: send, request, state, time, sync-time.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use serde::Serialize;

use payload_core::{message_id, Message, PayloadState};

use super::link::{await_message, open, parse_id, parse_payload, print_message, Options};

async fn send_message(opts: &Options, message: &Message) -> Result<super::link::CtlTransport> {
    let mut transport = open(opts)?;
    transport
        .deliver(message)
        .await
        .with_context(|| format!("failed to send {}", message_id::name(message.message_type())))?;
    Ok(transport)
}

/// Send and wait for the first reply.
async fn round_trip(opts: &Options, message: Message) -> Result<Message> {
    let mut transport = send_message(opts, &message).await?;
    await_message(&mut transport, opts.timeout)
        .await?
        .with_context(|| format!("no reply within {:?}", opts.timeout))
}

pub async fn cmd_send(opts: &Options, id: &str, payload: Option<&str>) -> Result<()> {
    let message = Message::new(parse_id(id)?, parse_payload(payload)?)?;
    send_message(opts, &message).await?;
    if !opts.json {
        println!(
            "sent 0x{:02x} {} ({} bytes)",
            message.message_type(),
            message_id::name(message.message_type()),
            message.body().len()
        );
    }
    Ok(())
}

pub async fn cmd_request(opts: &Options, id: &str, payload: Option<&str>) -> Result<()> {
    let message = Message::new(parse_id(id)?, parse_payload(payload)?)?;
    let reply = round_trip(opts, message).await?;
    print_message(&reply, opts.json)
}

#[derive(Serialize)]
struct StateView {
    state: PayloadState,
    code: u8,
}

pub async fn cmd_state(opts: &Options) -> Result<()> {
    let reply = round_trip(opts, Message::empty(message_id::REQUEST_PAYLOAD_STATE)).await?;
    if reply.message_type() != message_id::PAYLOAD_STATE {
        print_message(&reply, opts.json)?;
        bail!("unexpected reply {}", message_id::name(reply.message_type()));
    }
    let code = *reply.body().first().context("empty state reply")?;
    let state = PayloadState::from_u8(code).with_context(|| format!("unknown state 0x{code:02x}"))?;

    if opts.json {
        println!("{}", serde_json::to_string(&StateView { state, code })?);
    } else {
        println!("Payload state: {state} (0x{code:02x})");
    }
    Ok(())
}

#[derive(Serialize)]
struct TimeView {
    payload_secs: u64,
    ground_secs: u64,
    drift_secs: i64,
}

fn ground_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub async fn cmd_time(opts: &Options) -> Result<()> {
    let reply = round_trip(opts, Message::empty(message_id::REQUEST_TIME)).await?;
    if reply.message_type() != message_id::TIME {
        print_message(&reply, opts.json)?;
        bail!("unexpected reply {}", message_id::name(reply.message_type()));
    }
    let bytes: [u8; 8] = reply
        .body()
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .context("short time reply")?;
    let payload_secs = u64::from_le_bytes(bytes);
    let ground = ground_secs();
    let view = TimeView {
        payload_secs,
        ground_secs: ground,
        drift_secs: payload_secs as i64 - ground as i64,
    };

    if opts.json {
        println!("{}", serde_json::to_string(&view)?);
    } else {
        println!("Payload time : {}", view.payload_secs);
        println!("Ground time  : {}", view.ground_secs);
        println!("Drift        : {}s", view.drift_secs);
    }
    Ok(())
}

pub async fn cmd_sync_time(opts: &Options) -> Result<()> {
    let now = ground_secs();
    let message = Message::new(message_id::SYNCHRONIZE_TIME, now.to_le_bytes().to_vec())?;
    send_message(opts, &message).await?;
    if !opts.json {
        println!("synchronized payload clock to {now}");
    }
    Ok(())
}
