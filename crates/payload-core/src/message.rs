//! Messages — the application-level unit carried by the transport.
//!
//! A message is a `message_type` byte plus an arbitrary body. On the wire it
//! becomes one HEADER packet followed by `num_packets` DATA packets, each
//! carrying a consecutive slice of at most [`PAYLOAD_CAPACITY`] bytes. The
//! final slice carries only the bytes that remain, so reassembly yields the
//! original body exactly.

use bytes::{Bytes, BytesMut};

use crate::wire::{
    encode_data, encode_header, CodecError, Packet, PacketKind, MAX_PACKETS, PAYLOAD_CAPACITY,
};

/// Largest body that still fits in [`MAX_PACKETS`] data packets.
pub const MAX_BODY_LEN: usize = MAX_PACKETS * PAYLOAD_CAPACITY;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    message_type: u8,
    body: Bytes,
}

impl Message {
    /// Fails with `OutOfRange` if the body would need more than
    /// [`MAX_PACKETS`] data packets.
    pub fn new(message_type: u8, body: impl Into<Bytes>) -> Result<Self, CodecError> {
        let body = body.into();
        if body.len() > MAX_BODY_LEN {
            return Err(CodecError::OutOfRange(format!(
                "body of {} bytes needs more than {MAX_PACKETS} packets",
                body.len()
            )));
        }
        Ok(Self { message_type, body })
    }

    /// A message with no body. Still segments into one (empty) data packet.
    pub fn empty(message_type: u8) -> Self {
        Self {
            message_type,
            body: Bytes::new(),
        }
    }

    pub fn message_type(&self) -> u8 {
        self.message_type
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// `ceil(len / 60)`, with an empty body counting as one packet.
    pub fn num_packets(&self) -> usize {
        self.body.len().div_ceil(PAYLOAD_CAPACITY).max(1)
    }

    /// The body slice carried by DATA packet `seq` (1-indexed). Callers
    /// validate `seq`; see [`encode_data`].
    pub(crate) fn slice_for(&self, seq: usize) -> &[u8] {
        let start = (seq - 1) * PAYLOAD_CAPACITY;
        let end = (start + PAYLOAD_CAPACITY).min(self.body.len());
        &self.body[start.min(end)..end]
    }

    /// The HEADER packet for this message.
    pub fn header(&self) -> Packet {
        // num_packets is bounded by construction
        match encode_header(self.message_type, self.num_packets()) {
            Ok(p) => p,
            Err(_) => unreachable!("message invariant guarantees 1..=MAX_PACKETS packets"),
        }
    }

    /// DATA packet `seq` (1-indexed) of this message.
    pub fn data_packet(&self, seq: usize) -> Result<Packet, CodecError> {
        encode_data(self, seq)
    }
}

/// Split a message into its ordered packet sequence: the HEADER at 0 followed
/// by DATA packets `1..=num_packets`. Pure function of the message.
pub fn segment(message: &Message) -> Vec<(u16, Packet)> {
    let num_packets = message.num_packets();
    let mut packets = Vec::with_capacity(num_packets + 1);
    packets.push((0, message.header()));
    for seq in 1..=num_packets {
        let packet = Packet::data(seq as u16, message.slice_for(seq))
            .unwrap_or_else(|_| unreachable!("slices never exceed PAYLOAD_CAPACITY"));
        packets.push((seq as u16, packet));
    }
    packets
}

/// Rebuild a body from DATA packets.
///
/// Packets that are not DATA or do not carry the next expected sequence
/// number (duplicates, garbage) are skipped.
pub fn reassemble<'a, I>(packets: I, num_packets: u16) -> Result<Bytes, CodecError>
where
    I: IntoIterator<Item = &'a Packet>,
{
    let mut reassembler = Reassembler::new(num_packets);
    for packet in packets {
        reassembler.accept(packet);
        if reassembler.is_complete() {
            break;
        }
    }
    reassembler.finish()
}

/// Incremental reassembly, used by the transport's receive path.
#[derive(Debug)]
pub struct Reassembler {
    num_packets: u16,
    expected: u16,
    body: BytesMut,
}

impl Reassembler {
    pub fn new(num_packets: u16) -> Self {
        Self {
            num_packets,
            expected: 1,
            body: BytesMut::with_capacity(num_packets as usize * PAYLOAD_CAPACITY),
        }
    }

    /// Sequence number of the next DATA packet this reassembler will accept.
    pub fn expected(&self) -> u16 {
        self.expected
    }

    /// Sequence number of the last accepted DATA packet (0 = none yet,
    /// i.e. only the header).
    pub fn last_accepted(&self) -> u16 {
        self.expected - 1
    }

    /// Accept `packet` if it is the next DATA packet in order. Returns
    /// whether it was accepted.
    pub fn accept(&mut self, packet: &Packet) -> bool {
        if self.is_complete()
            || packet.kind() != PacketKind::Data
            || packet.sequence() != self.expected
        {
            return false;
        }
        self.body.extend_from_slice(packet.payload());
        self.expected += 1;
        true
    }

    pub fn is_complete(&self) -> bool {
        u32::from(self.expected) == u32::from(self.num_packets) + 1
    }

    pub fn finish(self) -> Result<Bytes, CodecError> {
        if !self.is_complete() {
            return Err(CodecError::Incomplete {
                received: self.last_accepted() as usize,
                expected: self.num_packets as usize,
            });
        }
        Ok(self.body.freeze())
    }
}
