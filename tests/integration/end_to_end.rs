//! Ground ↔ payload: commands in over the link, replies back out.

use std::time::Duration;

use payload_core::{message_id, Message, PayloadState};
use payload_services::{handler_fn, TaskRegistry};

use crate::*;

#[tokio::test]
async fn payload_state_request_reports_nominal() {
    let mut payload = Payload::spawn(TaskRegistry::with_builtins());

    let reply = payload
        .request(Message::empty(message_id::REQUEST_PAYLOAD_STATE))
        .await;
    assert_eq!(reply.message_type(), message_id::PAYLOAD_STATE);
    let state = PayloadState::from_u8(reply.body()[0]).unwrap();
    // the reply is produced while dispatching, so never from IDLE
    assert_eq!(state, PayloadState::Nominal);

    payload.shutdown().await;
}

#[tokio::test]
async fn debug_number_is_echoed() {
    let mut payload = Payload::spawn(TaskRegistry::with_builtins());

    let reply = payload
        .request(Message::new(message_id::DEBUG_NUMBER, vec![0x2a, 0x07]).unwrap())
        .await;
    assert_eq!(reply.message_type(), message_id::DEBUG_ECHO);
    assert_eq!(reply.body().as_ref(), &[0x2a, 0x07]);

    payload.shutdown().await;
}

#[tokio::test]
async fn synchronized_clock_is_reported_back() {
    let mut payload = Payload::spawn(TaskRegistry::with_builtins());

    let ground_secs: u64 = 3_000_000_000;
    payload
        .send(Message::new(message_id::SYNCHRONIZE_TIME, ground_secs.to_le_bytes().to_vec()).unwrap())
        .await;
    // SYNCHRONIZE_TIME outranks REQUEST_TIME, so even if both are queued
    // together the clock is set first
    let reply = payload.request(Message::empty(message_id::REQUEST_TIME)).await;
    assert_eq!(reply.message_type(), message_id::TIME);
    let secs = u64::from_le_bytes(reply.body()[..8].try_into().unwrap());
    assert!((ground_secs..ground_secs + 5).contains(&secs), "got {secs}");

    payload.shutdown().await;
}

#[tokio::test]
async fn unknown_command_gets_no_reply() {
    let mut payload = Payload::spawn(TaskRegistry::with_builtins());

    payload.send(Message::new(0x99, vec![1, 2, 3]).unwrap()).await;
    let reply = payload
        .request(Message::empty(message_id::REQUEST_PAYLOAD_STATE))
        .await;
    assert_eq!(reply.message_type(), message_id::PAYLOAD_STATE);
    assert!(payload.ctx.queue().is_empty());

    payload.shutdown().await;
}

#[tokio::test]
async fn failing_task_downlinks_task_failed() {
    let mut registry = TaskRegistry::with_builtins();
    registry.register(
        message_id::CAPTURE_AND_SEND_IMAGE,
        handler_fn(|_, _| anyhow::bail!("camera not powered")),
    );
    let mut payload = Payload::spawn(registry);

    let reply = payload
        .request(Message::empty(message_id::CAPTURE_AND_SEND_IMAGE))
        .await;
    assert_eq!(reply.message_type(), message_id::TASK_FAILED);
    assert_eq!(reply.body()[0], message_id::CAPTURE_AND_SEND_IMAGE);
    let reason = std::str::from_utf8(&reply.body()[1..]).unwrap();
    assert!(reason.contains("camera not powered"), "{reason}");

    payload.shutdown().await;
}

#[tokio::test]
async fn large_reply_is_segmented() {
    let mut registry = TaskRegistry::new();
    registry.register(
        message_id::REQUEST_LAST_IMAGE,
        handler_fn(|_, _| {
            let image: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
            Ok(Some(Message::new(message_id::REQUEST_LAST_IMAGE, image)?))
        }),
    );
    let mut payload = Payload::spawn(registry);

    let reply = payload
        .request(Message::empty(message_id::REQUEST_LAST_IMAGE))
        .await;
    assert_eq!(reply.body().len(), 2500);
    assert_eq!(reply.body()[251], 0);

    payload.shutdown().await;
}

#[tokio::test]
async fn fault_signal_stops_dispatch() {
    let mut payload = Payload::spawn(TaskRegistry::with_builtins());

    // let the controller leave STARTUP
    let first = payload
        .request(Message::empty(message_id::REQUEST_PAYLOAD_STATE))
        .await;
    assert_eq!(first.message_type(), message_id::PAYLOAD_STATE);

    payload.ctx.signal_fault(PayloadState::LowPower).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(payload.ctx.current_state(), PayloadState::LowPower);

    payload.send(Message::empty(message_id::REQUEST_TIME)).await;
    assert!(await_message(&mut payload.ground, Duration::from_millis(200))
        .await
        .is_none());
    assert_eq!(payload.ctx.queue().size(), 1);

    payload.shutdown().await;
}
