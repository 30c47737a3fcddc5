//! payload-core — wire format, messages, IDs, state and configuration.
//! All other payload crates depend on this one.

pub mod config;
pub mod message;
pub mod message_id;
pub mod state;
pub mod wire;

pub use message::{reassemble, segment, Message, Reassembler};
pub use state::PayloadState;
pub use wire::{CodecError, Packet, PacketKind};
