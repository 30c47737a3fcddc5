//! Transport — stop-and-wait message delivery over a byte link.
//!
//! Send: HEADER, then DATA 1..=n, each followed by a wait for one ACK.
//! An ACK for `k` moves the sender to `k + 1`; RESET or anything it cannot
//! use sends it back to the HEADER.
//!
//! Receive: HEADER → ACK 0 → DATA frames, each acknowledged with the last
//! accepted sequence number whether it matched or not. Mismatches are
//! bounded by `max_retries`; when the budget runs out the receiver sends
//! RESET so the far end starts over.
//!
//! The transport loop is the only owner of the link. One operation runs to
//! completion before the next starts, and shutdown is checked only between
//! operations.

use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};

use payload_core::config::TransportSettings;
use payload_core::message_id;
use payload_core::wire::{
    decode_meta, encode_ack, encode_reset, CodecError, Packet, PacketKind, METADATA_SIZE,
    PACKET_SIZE,
};
use payload_core::{Message, Reassembler};

use crate::link::{Link, LinkError};

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub ack_timeout: Duration,
    pub data_timeout: Duration,
    pub max_retries: u32,
    pub max_restarts: u32,
    pub resend_attempts: u32,
    pub idle_delay: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::from(&TransportSettings::default())
    }
}

impl From<&TransportSettings> for TransportConfig {
    fn from(s: &TransportSettings) -> Self {
        Self {
            ack_timeout: s.ack_timeout(),
            data_timeout: s.data_timeout(),
            max_retries: s.max_retries,
            max_restarts: s.max_restarts,
            resend_attempts: s.resend_attempts,
            idle_delay: s.idle_delay(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No response within the bound. The caller decides whether to resend.
    #[error("no response for packet {seq} within {timeout:?}")]
    Timeout { seq: u16, timeout: Duration },

    #[error("expected a header packet, got {0:?}")]
    InvalidHeader(PacketKind),

    /// Bad metadata or header bytes.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The far end could not deliver the expected packet; the link is
    /// considered desynchronized for this message.
    #[error("data packet {expected} not received after {retries} retries")]
    RetriesExhausted { expected: u16, retries: u32 },

    #[error("send restarted {0} times without completing")]
    RestartsExhausted(u32),

    #[error(transparent)]
    Link(LinkError),
}

impl From<LinkError> for TransportError {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

pub struct Transport<R, W> {
    link: Link<R, W>,
    config: TransportConfig,
}

impl<R, W> Transport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(link: Link<R, W>, config: TransportConfig) -> Self {
        Self { link, config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Deliver one message. Returns once the final DATA packet is ACKed.
    pub async fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        let num_packets = message.num_packets();
        let mut current: usize = 0;
        let mut restarts: u32 = 0;

        loop {
            let packet = if current == 0 {
                message.header()
            } else {
                message.data_packet(current)?
            };
            self.link.write_frame(&packet.to_bytes()).await?;
            tracing::trace!(seq = current, num_packets, "packet sent");

            let response = match self
                .link
                .read_exact_timeout(METADATA_SIZE, self.config.ack_timeout)
                .await
            {
                Ok(bytes) => bytes,
                Err(LinkError::Timeout(timeout)) => {
                    return Err(TransportError::Timeout {
                        seq: current as u16,
                        timeout,
                    })
                }
                Err(e) => return Err(e.into()),
            };

            match decode_meta(&response) {
                Ok((seq, PacketKind::Ack, _)) if (seq as usize) <= current => {
                    current = seq as usize + 1;
                    if current == num_packets + 1 {
                        tracing::debug!(
                            message_type = message.message_type(),
                            name = message_id::name(message.message_type()),
                            num_packets,
                            restarts,
                            "message sent"
                        );
                        return Ok(());
                    }
                }
                response => {
                    restarts += 1;
                    match response {
                        Ok((_, PacketKind::Reset, _)) => {
                            tracing::debug!(seq = current, "reset from peer, restarting from header")
                        }
                        Ok((seq, kind, _)) => tracing::debug!(
                            seq = current,
                            response_seq = seq,
                            ?kind,
                            "unexpected response, restarting from header"
                        ),
                        Err(e) => tracing::debug!(
                            seq = current,
                            error = %e,
                            "unreadable response, restarting from header"
                        ),
                    }
                    if restarts > self.config.max_restarts {
                        return Err(TransportError::RestartsExhausted(restarts - 1));
                    }
                    self.link.clear_input();
                    current = 0;
                }
            }
        }
    }

    /// `send`, resending the whole message after a timeout up to
    /// `resend_attempts` times.
    pub async fn deliver(&mut self, message: &Message) -> Result<(), TransportError> {
        let mut attempt = 0;
        loop {
            match self.send(message).await {
                Err(TransportError::Timeout { seq, .. }) if attempt < self.config.resend_attempts => {
                    attempt += 1;
                    tracing::warn!(seq, attempt, "send timed out, resending message");
                    self.link.clear_input();
                }
                other => return other,
            }
        }
    }

    async fn read_bytes(&mut self, n: usize, seq: u16) -> Result<bytes::Bytes, TransportError> {
        match self
            .link
            .read_exact_timeout(n, self.config.data_timeout)
            .await
        {
            Ok(bytes) => Ok(bytes),
            Err(LinkError::Timeout(timeout)) => Err(TransportError::Timeout { seq, timeout }),
            Err(e) => Err(e.into()),
        }
    }

    /// Read one frame, sized by its metadata: ACK and RESET are complete
    /// after `METADATA_SIZE` bytes, everything else is a full packet. The
    /// outer error is a link failure, the inner one an undecodable frame.
    async fn read_packet(
        &mut self,
        seq: u16,
    ) -> Result<Result<Packet, CodecError>, TransportError> {
        let meta = self.read_bytes(METADATA_SIZE, seq).await?;
        match decode_meta(&meta) {
            Ok((_, PacketKind::Ack | PacketKind::Reset, _)) => Ok(Packet::decode(&meta)),
            meta_result => {
                let rest = self.read_bytes(PACKET_SIZE - METADATA_SIZE, seq).await?;
                if let Err(e) = meta_result {
                    return Ok(Err(e));
                }
                let mut frame = bytes::BytesMut::with_capacity(PACKET_SIZE);
                frame.extend_from_slice(&meta);
                frame.extend_from_slice(&rest);
                Ok(Packet::decode(&frame))
            }
        }
    }

    async fn send_control(&mut self, packet: Packet) -> Result<(), TransportError> {
        self.link.write_frame(&packet.to_bytes()).await?;
        Ok(())
    }

    /// Receive one message. The first frame on the link must be a HEADER.
    pub async fn receive(&mut self) -> Result<Message, TransportError> {
        let header = match self.read_packet(0).await? {
            Ok(p) if p.kind() == PacketKind::Header => p,
            Ok(p) => {
                self.link.clear_input();
                return Err(TransportError::InvalidHeader(p.kind()));
            }
            Err(e) => {
                self.link.clear_input();
                return Err(e.into());
            }
        };
        let (mut message_type, num_packets) = self.header_fields(&header)?;
        self.send_control(encode_ack(header.sequence())).await?;

        let mut reassembler = Reassembler::new(num_packets);
        let mut retries: u32 = 0;

        while !reassembler.is_complete() {
            let packet = self.read_packet(reassembler.expected()).await?;

            let accepted = match &packet {
                Ok(p) => reassembler.accept(p),
                Err(_) => false,
            };

            if accepted {
                retries = 0;
            } else {
                if retries >= self.config.max_retries {
                    self.link.clear_input();
                    self.send_control(encode_reset()).await?;
                    return Err(TransportError::RetriesExhausted {
                        expected: reassembler.expected(),
                        retries,
                    });
                }
                retries += 1;
                self.link.clear_input();

                match packet {
                    // The sender went back to its header; follow it.
                    Ok(p) if p.kind() == PacketKind::Header => {
                        let (restart_type, restart_packets) = self.header_fields(&p)?;
                        tracing::debug!(retries, "header mid-message, restarting reassembly");
                        message_type = restart_type;
                        reassembler = Reassembler::new(restart_packets);
                    }
                    Ok(p) => tracing::debug!(
                        expected = reassembler.expected(),
                        got = p.sequence(),
                        kind = ?p.kind(),
                        retries,
                        "unexpected data packet"
                    ),
                    Err(e) => tracing::debug!(
                        expected = reassembler.expected(),
                        error = %e,
                        retries,
                        "malformed data packet"
                    ),
                }
            }

            self.send_control(encode_ack(reassembler.last_accepted()))
                .await?;
        }

        let body = reassembler.finish()?;
        let message = Message::new(message_type, body)?;
        tracing::debug!(
            message_type,
            name = message_id::name(message_type),
            len = message.body().len(),
            "message received"
        );
        Ok(message)
    }

    fn header_fields(&mut self, header: &Packet) -> Result<(u8, u16), TransportError> {
        match header.header_fields() {
            Ok((_, 0)) => {
                self.link.clear_input();
                Err(CodecError::MalformedPacket("header announces zero packets".into()).into())
            }
            Ok(fields) => Ok(fields),
            Err(e) => {
                self.link.clear_input();
                Err(e.into())
            }
        }
    }

    /// Receive a message if any bytes show up within `wait`.
    pub async fn poll_receive(&mut self, wait: Duration) -> Result<Option<Message>, TransportError> {
        if self.link.bytes_available(wait).await? == 0 {
            return Ok(None);
        }
        match self.receive().await {
            Ok(message) => Ok(Some(message)),
            Err(e) => {
                // start the next attempt on a frame boundary
                self.link.clear_input();
                Err(e)
            }
        }
    }

    /// One loop iteration: send at most one queued message, then receive at
    /// most one message. Protocol errors are logged and swallowed; only a
    /// closed link or a dropped inbound queue ends the loop.
    pub async fn step(
        &mut self,
        outbound_rx: &mut mpsc::UnboundedReceiver<Message>,
        inbound_tx: &mpsc::UnboundedSender<Message>,
    ) -> Result<()> {
        if let Ok(message) = outbound_rx.try_recv() {
            match self.deliver(&message).await {
                Ok(()) => {}
                Err(TransportError::Link(LinkError::Closed)) => {
                    anyhow::bail!("link closed while sending")
                }
                Err(e) => tracing::warn!(
                    message_type = message.message_type(),
                    name = message_id::name(message.message_type()),
                    error = %e,
                    "send failed, message abandoned"
                ),
            }
        }

        match self.poll_receive(Duration::ZERO).await {
            Ok(Some(message)) => {
                if inbound_tx.send(message).is_err() {
                    anyhow::bail!("inbound queue dropped");
                }
            }
            Ok(None) => {}
            Err(TransportError::Link(LinkError::Closed)) => anyhow::bail!("link closed while receiving"),
            Err(e) => tracing::warn!(error = %e, "receive failed"),
        }

        Ok(())
    }

    /// The background transport loop.
    pub async fn run(
        mut self,
        mut outbound_rx: mpsc::UnboundedReceiver<Message>,
        inbound_tx: mpsc::UnboundedSender<Message>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        tracing::info!(
            idle_delay_ms = self.config.idle_delay.as_millis() as u64,
            "transport loop started"
        );
        loop {
            if !matches!(
                shutdown.try_recv(),
                Err(broadcast::error::TryRecvError::Empty)
            ) {
                tracing::info!("transport loop shutting down");
                return Ok(());
            }

            if let Err(e) = self.step(&mut outbound_rx, &inbound_tx).await {
                tracing::warn!(error = %e, "transport loop exiting");
                return Ok(());
            }

            tokio::time::sleep(self.config.idle_delay).await;
        }
    }
}
