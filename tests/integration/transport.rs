//! Transport-to-transport delivery over clean and lossy pipes.

use std::time::Duration;

use payload_core::wire::{encode_ack, Packet, PacketKind, METADATA_SIZE, PACKET_SIZE};
use payload_core::Message;
use payload_services::{Link, Transport, TransportError};

use crate::*;

fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

#[tokio::test]
async fn messages_of_every_shape_cross_the_link() {
    let (mut ground, mut flight) = transport_pair();

    let receiver = tokio::spawn(async move {
        let mut got = Vec::new();
        for _ in 0..6 {
            got.push(flight.receive().await.expect("receive"));
        }
        got
    });

    let sent: Vec<Message> = [0, 1, 60, 61, 180, 4000]
        .into_iter()
        .enumerate()
        .map(|(i, len)| Message::new(i as u8, body(len)).unwrap())
        .collect();
    for message in &sent {
        ground.send(message).await.expect("send");
    }

    assert_eq!(receiver.await.unwrap(), sent);
}

#[tokio::test]
async fn corrupted_data_frame_is_resent() {
    // writes: 0 = header, 1 = data 1, 2 = data 2 (garbled), 3 = data 2 again
    let (mut ground, mut flight) = faulty_pair(&[2]);
    let message = Message::new(0x42, body(150)).unwrap();

    let receiver = tokio::spawn(async move { flight.receive().await });
    ground.send(&message).await.expect("send recovers");

    assert_eq!(receiver.await.unwrap().unwrap(), message);
}

#[tokio::test]
async fn corrupted_ack_restarts_from_header() {
    // the flight side's second write is its ACK for data 1
    let (mut flight, mut ground) = faulty_pair(&[1]);
    let message = Message::new(0x30, body(100)).unwrap();

    let receiver = tokio::spawn(async move { flight.receive().await });
    ground.send(&message).await.expect("send recovers");

    assert_eq!(receiver.await.unwrap().unwrap(), message);
}

#[tokio::test]
async fn resend_policy_retries_the_whole_message() {
    let (a, b) = tokio::io::duplex(PIPE_CAPACITY);
    let mut config = transport_config();
    config.ack_timeout = Duration::from_millis(100);
    config.resend_attempts = 1;
    let mut ground = Transport::new(Link::from_stream(a), config);
    let mut peer = Link::from_stream(b);

    let message = Message::new(0x01, body(10)).unwrap();
    let sender = tokio::spawn(async move { ground.deliver(&message).await });

    let wait = Duration::from_secs(1);
    // ignore the first header entirely
    peer.read_exact_timeout(PACKET_SIZE, wait).await.unwrap();
    let second = peer.read_exact_timeout(PACKET_SIZE, wait).await.unwrap();
    assert_eq!(Packet::decode(&second).unwrap().kind(), PacketKind::Header);
    peer.write_frame(&encode_ack(0).to_bytes()).await.unwrap();
    peer.read_exact_timeout(PACKET_SIZE, wait).await.unwrap();
    peer.write_frame(&encode_ack(1).to_bytes()).await.unwrap();

    sender.await.unwrap().expect("second attempt succeeds");
}

#[tokio::test]
async fn default_policy_abandons_after_timeout() {
    let (a, b) = tokio::io::duplex(PIPE_CAPACITY);
    let mut config = transport_config();
    config.ack_timeout = Duration::from_millis(50);
    let mut ground = Transport::new(Link::from_stream(a), config);
    let mut peer = Link::from_stream(b);

    let err = ground
        .deliver(&Message::empty(0x01))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Timeout { seq: 0, .. }));

    // exactly one header went out
    peer.read_exact_timeout(PACKET_SIZE, Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(peer.bytes_available(Duration::from_millis(20)).await.unwrap(), 0);
}

#[tokio::test]
async fn acks_are_metadata_sized() {
    let (a, b) = tokio::io::duplex(PIPE_CAPACITY);
    let mut flight = Transport::new(Link::from_stream(a), transport_config());
    let mut ground = Link::from_stream(b);

    let receiver = tokio::spawn(async move { flight.receive().await });
    let message = Message::new(0x20, body(5)).unwrap();
    for (_, packet) in payload_core::segment(&message) {
        ground.write_frame(&packet.to_bytes()).await.unwrap();
        let ack = ground
            .read_exact_timeout(METADATA_SIZE, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(Packet::decode(&ack).unwrap().kind(), PacketKind::Ack);
    }
    assert_eq!(receiver.await.unwrap().unwrap(), message);
    assert_eq!(ground.bytes_available(Duration::from_millis(20)).await.unwrap(), 0);
}
