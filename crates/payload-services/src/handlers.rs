//! Built-in task handlers.
//!
//! Only the handlers that need nothing beyond the controller itself live
//! here. Camera, inference and attitude/orbit IDs are left for external
//! collaborators to register.

use anyhow::{ensure, Context};
use rand::Rng;

use payload_core::{message_id, Message};

use crate::context::PayloadContext;
use crate::registry::TaskRegistry;

/// Time synchronisation jumps ahead of routine requests.
const SYNCHRONIZE_TIME_PRIORITY: u8 = 10;

/// Probability that DEBUG_RANDOM_ERROR fails an attempt.
const RANDOM_ERROR_RATE: f64 = 0.7;

/// Longest failure reason carried in a TASK_FAILED reply.
const MAX_REASON_LEN: usize = 119;

pub fn register_builtins(registry: &mut TaskRegistry) {
    registry.register_with_priority(
        message_id::SYNCHRONIZE_TIME,
        SYNCHRONIZE_TIME_PRIORITY,
        synchronize_time,
    );
    registry.register(message_id::REQUEST_TIME, request_time);
    registry.register(message_id::REQUEST_PAYLOAD_STATE, request_payload_state);
    registry.register(message_id::DEBUG_HELLO, debug_hello);
    registry.register(message_id::DEBUG_GOODBYE, debug_goodbye);
    registry.register(message_id::DEBUG_NUMBER, debug_number);
    registry.register(message_id::DEBUG_RANDOM_ERROR, debug_random_error);
}

/// Payload: ground unix time in seconds, u64 little-endian.
pub fn synchronize_time(ctx: &PayloadContext, payload: &[u8]) -> anyhow::Result<Option<Message>> {
    let bytes: [u8; 8] = payload
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .context("SYNCHRONIZE_TIME needs an 8-byte timestamp")?;
    let ground_secs = u64::from_le_bytes(bytes);
    let offset = ctx
        .clock()
        .synchronize(ground_secs)
        .with_context(|| format!("ground time {ground_secs} is out of range"))?;
    tracing::info!(ground_secs, offset_secs = offset, "mission clock synchronized");
    Ok(None)
}

pub fn request_time(ctx: &PayloadContext, _payload: &[u8]) -> anyhow::Result<Option<Message>> {
    let now = ctx.clock().now_secs();
    Ok(Some(Message::new(message_id::TIME, now.to_le_bytes().to_vec())?))
}

pub fn request_payload_state(
    ctx: &PayloadContext,
    _payload: &[u8],
) -> anyhow::Result<Option<Message>> {
    let state = ctx.current_state();
    Ok(Some(Message::new(
        message_id::PAYLOAD_STATE,
        vec![u8::from(state)],
    )?))
}

pub fn debug_hello(_ctx: &PayloadContext, payload: &[u8]) -> anyhow::Result<Option<Message>> {
    tracing::info!(payload = hex::encode(payload), "hello from ground");
    Ok(None)
}

pub fn debug_goodbye(_ctx: &PayloadContext, payload: &[u8]) -> anyhow::Result<Option<Message>> {
    tracing::info!(payload = hex::encode(payload), "goodbye from ground");
    Ok(None)
}

/// Echoes the payload back as DEBUG_ECHO.
pub fn debug_number(_ctx: &PayloadContext, payload: &[u8]) -> anyhow::Result<Option<Message>> {
    ensure!(!payload.is_empty(), "DEBUG_NUMBER needs a payload");
    Ok(Some(Message::new(message_id::DEBUG_ECHO, payload.to_vec())?))
}

pub fn debug_random_error(
    _ctx: &PayloadContext,
    _payload: &[u8],
) -> anyhow::Result<Option<Message>> {
    ensure!(
        !rand::thread_rng().gen_bool(RANDOM_ERROR_RATE),
        "random debug failure"
    );
    tracing::info!("random debug task survived");
    Ok(None)
}

/// TASK_FAILED reply: the failed task's ID followed by a UTF-8 reason.
pub fn task_failed(id: u8, reason: &str) -> Message {
    let mut end = reason.len().min(MAX_REASON_LEN);
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    let mut body = Vec::with_capacity(1 + end);
    body.push(id);
    body.extend_from_slice(&reason.as_bytes()[..end]);
    Message::new(message_id::TASK_FAILED, body)
        .unwrap_or_else(|_| Message::empty(message_id::TASK_FAILED))
}
