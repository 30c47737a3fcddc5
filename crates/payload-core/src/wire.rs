//! Payload wire format — the fixed-size frames exchanged over the link.
//!
//! These types ARE the protocol. Every field and size is part of the frame
//! format shared with the flight computer on the other end of the UART.
//!
//! ```text
//! metadata (4 bytes):  sequence:u16le | kind:u8 | payload_len:u8
//! header body (4):     message_type:u8 | reserved:u8 | num_packets:u16le
//! frame (64):          metadata | payload[60]
//! ```
//!
//! HEADER and DATA packets travel as full 64-byte frames, zero padded past
//! `payload_len`. ACK and RESET packets travel as bare metadata (4 bytes).
//! All layouts use zerocopy derives with explicit little-endian integers,
//! so there is no unsafe code and no host-endianness dependence.

use bytes::Bytes;
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{LittleEndian, U16};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::message::Message;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Size of a HEADER or DATA frame on the wire.
pub const PACKET_SIZE: usize = 64;

/// Size of the metadata prefix carried by every frame.
pub const METADATA_SIZE: usize = 4;

/// Payload bytes available in a single frame.
pub const PAYLOAD_CAPACITY: usize = PACKET_SIZE - METADATA_SIZE;

/// Size of the header packet body (`message_type`, reserved, `num_packets`).
pub const HEADER_BODY_SIZE: usize = 4;

/// Largest number of DATA packets a single message may span.
pub const MAX_PACKETS: usize = 0xFFFF;

// ── Packet kind ───────────────────────────────────────────────────────────────

/// Discriminator carried in the metadata `kind` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    Header = 0x00,
    Data = 0x01,
    Ack = 0x02,
    Reset = 0x03,
}

impl TryFrom<u8> for PacketKind {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(PacketKind::Header),
            0x01 => Ok(PacketKind::Data),
            0x02 => Ok(PacketKind::Ack),
            0x03 => Ok(PacketKind::Reset),
            other => Err(CodecError::MalformedPacket(format!(
                "unknown packet kind 0x{other:02x}"
            ))),
        }
    }
}

impl From<PacketKind> for u8 {
    fn from(k: PacketKind) -> u8 {
        k as u8
    }
}

// ── On-wire layouts ───────────────────────────────────────────────────────────

/// Metadata prefix of every frame.
///
/// Wire size: 4 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct PacketMeta {
    /// HEADER: always 0. DATA: 1-indexed packet number. ACK: last accepted
    /// sequence. RESET: always 0.
    pub sequence: U16<LittleEndian>,

    /// One of [`PacketKind`].
    pub kind: u8,

    /// Number of meaningful bytes in the payload region. Never above
    /// [`PAYLOAD_CAPACITY`].
    pub payload_len: u8,
}

assert_eq_size!(PacketMeta, [u8; METADATA_SIZE]);

/// Body of the HEADER packet. Encoded through its own path rather than the
/// generic data slicer so its size is checked at compile time.
///
/// Wire size: 4 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct HeaderBody {
    pub message_type: u8,
    /// Must be zero.
    pub reserved: u8,
    pub num_packets: U16<LittleEndian>,
}

assert_eq_size!(HeaderBody, [u8; HEADER_BODY_SIZE]);

/// A complete HEADER/DATA frame.
///
/// Wire size: 64 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
struct Frame {
    meta: PacketMeta,
    payload: [u8; PAYLOAD_CAPACITY],
}

assert_eq_size!(Frame, [u8; PACKET_SIZE]);

// ── Decoded packet ────────────────────────────────────────────────────────────

/// A decoded packet. The payload region is always zero padded past
/// `payload_len`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    sequence: u16,
    kind: PacketKind,
    payload_len: u8,
    payload: [u8; PAYLOAD_CAPACITY],
}

impl Packet {
    fn with_payload(sequence: u16, kind: PacketKind, data: &[u8]) -> Result<Self, CodecError> {
        if data.len() > PAYLOAD_CAPACITY {
            return Err(CodecError::OutOfRange(format!(
                "payload of {} bytes exceeds frame capacity {PAYLOAD_CAPACITY}",
                data.len()
            )));
        }
        let mut payload = [0u8; PAYLOAD_CAPACITY];
        payload[..data.len()].copy_from_slice(data);
        Ok(Self {
            sequence,
            kind,
            payload_len: data.len() as u8,
            payload,
        })
    }

    /// Build a DATA packet around an arbitrary slice.
    pub fn data(sequence: u16, data: &[u8]) -> Result<Self, CodecError> {
        if sequence == 0 {
            return Err(CodecError::OutOfRange(
                "data packet sequence must be at least 1".into(),
            ));
        }
        Self::with_payload(sequence, PacketKind::Data, data)
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len as usize
    }

    /// The meaningful payload bytes (`..payload_len`).
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload_len as usize]
    }

    /// Number of bytes this packet occupies on the wire.
    pub fn wire_len(&self) -> usize {
        match self.kind {
            PacketKind::Header | PacketKind::Data => PACKET_SIZE,
            PacketKind::Ack | PacketKind::Reset => METADATA_SIZE,
        }
    }

    fn frame(&self) -> Frame {
        Frame {
            meta: PacketMeta {
                sequence: U16::new(self.sequence),
                kind: self.kind.into(),
                payload_len: self.payload_len,
            },
            payload: self.payload,
        }
    }

    /// Serialize to exactly [`Packet::wire_len`] bytes.
    pub fn to_bytes(&self) -> Bytes {
        let frame = self.frame();
        Bytes::copy_from_slice(&frame.as_bytes()[..self.wire_len()])
    }

    /// Decode a frame. Reads the metadata, then exactly `payload_len` bytes
    /// of payload; anything beyond is ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let (sequence, kind, payload_len) = decode_meta(bytes)?;
        let end = METADATA_SIZE + payload_len as usize;
        if bytes.len() < end {
            return Err(CodecError::MalformedPacket(format!(
                "declared payload of {payload_len} bytes but only {} available",
                bytes.len() - METADATA_SIZE
            )));
        }
        Self::with_payload(sequence, kind, &bytes[METADATA_SIZE..end])
            .map_err(|e| CodecError::MalformedPacket(e.to_string()))
    }

    /// Interpret this packet as a HEADER and return `(message_type, num_packets)`.
    pub fn header_fields(&self) -> Result<(u8, u16), CodecError> {
        if self.kind != PacketKind::Header {
            return Err(CodecError::MalformedPacket(format!(
                "expected header packet, got {:?}",
                self.kind
            )));
        }
        decode_header_body(self.payload())
    }
}

// ── Encoders ──────────────────────────────────────────────────────────────────

/// Build the HEADER packet announcing a message of `num_packets` DATA packets.
pub fn encode_header(message_type: u8, num_packets: usize) -> Result<Packet, CodecError> {
    if num_packets == 0 || num_packets > MAX_PACKETS {
        return Err(CodecError::OutOfRange(format!(
            "num_packets {num_packets} outside 1..={MAX_PACKETS}"
        )));
    }
    let body = HeaderBody {
        message_type,
        reserved: 0,
        num_packets: U16::new(num_packets as u16),
    };
    Packet::with_payload(0, PacketKind::Header, body.as_bytes())
}

/// Build DATA packet `seq` (1-indexed) of `message`.
pub fn encode_data(message: &Message, seq: usize) -> Result<Packet, CodecError> {
    let num_packets = message.num_packets();
    if seq == 0 || seq > num_packets {
        return Err(CodecError::OutOfRange(format!(
            "data packet {seq} outside 1..={num_packets}"
        )));
    }
    Packet::data(seq as u16, message.slice_for(seq))
}

pub fn encode_ack(seq: u16) -> Packet {
    Packet {
        sequence: seq,
        kind: PacketKind::Ack,
        payload_len: 0,
        payload: [0u8; PAYLOAD_CAPACITY],
    }
}

pub fn encode_reset() -> Packet {
    Packet {
        sequence: 0,
        kind: PacketKind::Reset,
        payload_len: 0,
        payload: [0u8; PAYLOAD_CAPACITY],
    }
}

// ── Decoders ──────────────────────────────────────────────────────────────────

/// Parse the metadata prefix: `(sequence, kind, payload_len)`.
pub fn decode_meta(bytes: &[u8]) -> Result<(u16, PacketKind, u8), CodecError> {
    let meta = PacketMeta::read_from_prefix(bytes).ok_or_else(|| {
        CodecError::MalformedPacket(format!(
            "metadata needs {METADATA_SIZE} bytes, got {}",
            bytes.len()
        ))
    })?;
    let kind = PacketKind::try_from(meta.kind)?;
    if meta.payload_len as usize > PAYLOAD_CAPACITY {
        return Err(CodecError::MalformedPacket(format!(
            "payload_len {} exceeds capacity {PAYLOAD_CAPACITY}",
            meta.payload_len
        )));
    }
    Ok((meta.sequence.get(), kind, meta.payload_len))
}

/// Parse a header body (the payload region of a HEADER packet).
pub fn decode_header_body(bytes: &[u8]) -> Result<(u8, u16), CodecError> {
    let body = HeaderBody::read_from_prefix(bytes).ok_or_else(|| {
        CodecError::MalformedPacket(format!(
            "header body needs {HEADER_BODY_SIZE} bytes, got {}",
            bytes.len()
        ))
    })?;
    Ok((body.message_type, body.num_packets.get()))
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors raised while building or interpreting packets and messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Construction-time misuse. Rejected before any I/O happens.
    #[error("value out of range: {0}")]
    OutOfRange(String),

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("incomplete message: {received} of {expected} data packets")]
    Incomplete { received: usize, expected: usize },
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_packet_layout() {
        let packet = encode_header(0x21, 0x0102).unwrap();
        let bytes = packet.to_bytes();
        assert_eq!(bytes.len(), PACKET_SIZE);
        // sequence 0, kind HEADER, payload_len 4
        assert_eq!(&bytes[..4], &[0x00, 0x00, 0x00, 0x04]);
        // message_type, reserved, num_packets little-endian
        assert_eq!(&bytes[4..8], &[0x21, 0x00, 0x02, 0x01]);
        assert!(bytes[8..].iter().all(|b| *b == 0));
    }

    #[test]
    fn header_fields_decode() {
        let bytes = encode_header(0xFE, 65535).unwrap().to_bytes();
        let packet = Packet::decode(&bytes).unwrap();
        assert_eq!(packet.kind(), PacketKind::Header);
        assert_eq!(packet.header_fields().unwrap(), (0xFE, 65535));
    }

    #[test]
    fn header_rejects_out_of_range_packet_count() {
        assert!(matches!(encode_header(1, 0), Err(CodecError::OutOfRange(_))));
        assert!(matches!(
            encode_header(1, MAX_PACKETS + 1),
            Err(CodecError::OutOfRange(_))
        ));
    }

    #[test]
    fn ack_and_reset_are_metadata_only() {
        let ack = encode_ack(513).to_bytes();
        assert_eq!(ack.len(), METADATA_SIZE);
        assert_eq!(decode_meta(&ack).unwrap(), (513, PacketKind::Ack, 0));

        let reset = encode_reset().to_bytes();
        assert_eq!(reset.len(), METADATA_SIZE);
        assert_eq!(decode_meta(&reset).unwrap(), (0, PacketKind::Reset, 0));
    }

    #[test]
    fn decode_meta_rejects_short_buffer() {
        let err = decode_meta(&[0x01, 0x00, 0x01]).unwrap_err();
        assert!(matches!(err, CodecError::MalformedPacket(_)));
    }

    #[test]
    fn decode_meta_rejects_unknown_kind() {
        let err = decode_meta(&[0x00, 0x00, 0x07, 0x00]).unwrap_err();
        assert!(err.to_string().contains("0x07"));
    }

    #[test]
    fn decode_meta_rejects_oversized_payload_len() {
        let err = decode_meta(&[0x01, 0x00, 0x01, 61]).unwrap_err();
        assert!(matches!(err, CodecError::MalformedPacket(_)));
    }

    #[test]
    fn decode_never_reads_past_payload_len() {
        let mut frame = Packet::data(3, b"abc").unwrap().to_bytes().to_vec();
        // garbage after the declared payload must not leak into the packet
        frame[10] = 0xAA;
        let packet = Packet::decode(&frame).unwrap();
        assert_eq!(packet.payload(), b"abc");
        assert_eq!(packet.sequence(), 3);
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let frame = Packet::data(1, &[7u8; 20]).unwrap().to_bytes();
        assert!(Packet::decode(&frame[..10]).is_err());
    }

    #[test]
    fn header_body_short_input() {
        assert!(matches!(
            decode_header_body(&[0x01, 0x00]),
            Err(CodecError::MalformedPacket(_))
        ));
    }

    #[test]
    fn data_packet_rejects_oversized_slice() {
        assert!(matches!(
            Packet::data(1, &[0u8; PAYLOAD_CAPACITY + 1]),
            Err(CodecError::OutOfRange(_))
        ));
        assert!(Packet::data(0, b"x").is_err());
    }

    #[test]
    fn packet_kind_round_trip() {
        for kind in [
            PacketKind::Header,
            PacketKind::Data,
            PacketKind::Ack,
            PacketKind::Reset,
        ] {
            assert_eq!(PacketKind::try_from(u8::from(kind)).unwrap(), kind);
        }
        assert!(PacketKind::try_from(0x04).is_err());
    }
}
