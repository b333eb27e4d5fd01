//! # ThrottleTalk Protocol
//!
//! Wire format for ThrottleTalk voice channels.
//!
//! This crate provides:
//! - `Packet`: the fixed-layout datagram carried between clients and the relay
//! - `PacketType`: audio / control / heartbeat discriminants
//! - `PacketFlags`: the per-packet flag byte (VOX, self-mute, admin claim)
//! - `ControlCommand`: typed moderation commands (mute / unmute / kick / leave)
//! - `control`: command and notice bytes, targeted-notice builder
//! - CRC32 framing integrity (ISO-3309, zlib variant)
//!
//! ## Example
//!
//! ```
//! use throttletalk_protocol::{Packet, PacketFlags, PacketType};
//! use bytes::Bytes;
//! use uuid::Uuid;
//!
//! let packet = Packet::new(
//!     PacketType::Audio,
//!     7,                      // sequence
//!     42,                     // sender timestamp
//!     Uuid::new_v4(),         // channel
//!     Uuid::new_v4(),         // participant
//!     PacketFlags::VOX_ACTIVE,
//!     Bytes::from_static(b"opus frame"),
//! );
//!
//! let bytes = packet.encode();
//! let decoded = Packet::decode(&bytes).unwrap();
//! assert_eq!(decoded, packet);
//! ```

pub mod checksum;
pub mod control;
pub mod error;
pub mod packet;
pub mod transport;

pub use control::ControlCommand;
pub use error::{PacketError, Result};
pub use transport::DatagramSink;
pub use packet::{
    Packet, PacketFlags, PacketType, HEADER_SIZE, MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE,
    MIN_PACKET_SIZE, PACKET_MAGIC, PROTOCOL_VERSION,
};

/// Identifier of a voice channel; opaque 16 bytes on the wire.
pub type ChannelId = uuid::Uuid;

/// Identifier of a channel participant; opaque 16 bytes on the wire.
pub type ParticipantId = uuid::Uuid;
