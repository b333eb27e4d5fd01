use crate::checksum;
use crate::error::{PacketError, Result};
use crate::{ChannelId, ParticipantId};
use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

/// Frame magic, the ASCII bytes "TTLK" read as a big-endian u32.
pub const PACKET_MAGIC: u32 = 0x5454_4C4B;

/// Current wire protocol version.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Fixed header size in bytes (everything before the payload).
pub const HEADER_SIZE: usize = 50;

/// Size of the trailing CRC32.
const CRC_SIZE: usize = 4;

/// Minimum size of a full frame: header plus CRC, empty payload.
pub const MIN_PACKET_SIZE: usize = HEADER_SIZE + CRC_SIZE;

/// Maximum payload size accepted on the wire.
pub const MAX_PAYLOAD_SIZE: usize = 2048;

/// Largest possible frame; receive buffers are sized to this.
pub const MAX_PACKET_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE + CRC_SIZE;

/// Packet type discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Opaque audio frame, fanned out to every other channel member
    Audio = 0x01,

    /// In-band moderation command or targeted notice
    Control = 0x02,

    /// Presence/liveness beacon, fanned out like audio
    Heartbeat = 0x03,
}

impl PacketType {
    /// Parses a wire discriminant; unknown values are rejected by `decode`.
    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(PacketType::Audio),
            0x02 => Some(PacketType::Control),
            0x03 => Some(PacketType::Heartbeat),
            _ => None,
        }
    }
}

bitflags! {
    /// Per-packet flag byte
    ///
    /// - bit 0: VOX_ACTIVE - sender-side voice activity detected
    /// - bit 1: SELF_MUTED - sender reports itself muted
    /// - bit 2: ADMIN - admin claim, trusted only on heartbeats
    /// - bits 3-7: undefined, preserved verbatim
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PacketFlags: u8 {
        /// Sender-side voice activity detected
        const VOX_ACTIVE = 0b0000_0001;
        /// Sender reports itself muted
        const SELF_MUTED = 0b0000_0010;
        /// Admin claim; authority derives from the sticky admin set, not this bit
        const ADMIN = 0b0000_0100;
    }
}

/// A ThrottleTalk datagram.
///
/// Wire format (big-endian multi-byte integers):
/// ```text
/// ┌────────────────┬─────────┬───────────┐
/// │ magic "TTLK"   │ u32     │  4 bytes  │
/// ├────────────────┼─────────┼───────────┤
/// │ version        │ u8      │  1 byte   │
/// ├────────────────┼─────────┼───────────┤
/// │ type           │ u8      │  1 byte   │
/// ├────────────────┼─────────┼───────────┤
/// │ sequence       │ u32     │  4 bytes  │
/// ├────────────────┼─────────┼───────────┤
/// │ timestamp      │ u32     │  4 bytes  │
/// ├────────────────┼─────────┼───────────┤
/// │ channel_id     │ [u8;16] │ 16 bytes  │
/// ├────────────────┼─────────┼───────────┤
/// │ participant_id │ [u8;16] │ 16 bytes  │
/// ├────────────────┼─────────┼───────────┤
/// │ flags          │ u8      │  1 byte   │
/// ├────────────────┼─────────┼───────────┤
/// │ reserved       │ u8      │  1 byte   │
/// ├────────────────┼─────────┼───────────┤
/// │ payload_len    │ u16     │  2 bytes  │
/// ├────────────────┼─────────┼───────────┤
/// │ payload        │ [u8]    │  N bytes  │
/// ├────────────────┼─────────┼───────────┤
/// │ crc32          │ u32     │  4 bytes  │
/// └────────────────┴─────────┴───────────┘
/// Header: 50 bytes. CRC covers header and payload.
/// ```
///
/// `sequence` and `timestamp` are sender-assigned and opaque to the relay:
/// it never dedupes, reorders, or stamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Audio, control, or heartbeat
    pub packet_type: PacketType,

    /// Sender-assigned monotonic hint, not inspected for routing
    pub sequence: u32,

    /// Sender clock, opaque to the relay
    pub timestamp: u32,

    /// Destination voice channel
    pub channel_id: ChannelId,

    /// Sender identity
    pub participant_id: ParticipantId,

    /// Flag byte (VOX, self-mute, admin claim)
    pub flags: PacketFlags,

    /// Unused wire byte; any value accepted and round-tripped verbatim
    pub reserved: u8,

    /// Opaque payload, at most [`MAX_PAYLOAD_SIZE`] bytes
    pub payload: Bytes,
}

impl Packet {
    /// Creates a new packet with a zeroed reserved byte.
    ///
    /// The caller is responsible for keeping `payload` within
    /// [`MAX_PAYLOAD_SIZE`]; `encode` debug-asserts it.
    pub fn new(
        packet_type: PacketType,
        sequence: u32,
        timestamp: u32,
        channel_id: ChannelId,
        participant_id: ParticipantId,
        flags: PacketFlags,
        payload: Bytes,
    ) -> Self {
        Self {
            packet_type,
            sequence,
            timestamp,
            channel_id,
            participant_id,
            flags,
            reserved: 0,
            payload,
        }
    }

    /// Serializes the packet into a fresh buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(MIN_PACKET_SIZE + self.payload.len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Appends the wire layout to `buf`, then the CRC32 of exactly the bytes
    /// just written.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        debug_assert!(self.payload.len() <= MAX_PAYLOAD_SIZE);

        let start = buf.len();
        buf.put_u32(PACKET_MAGIC);
        buf.put_u8(PROTOCOL_VERSION);
        buf.put_u8(self.packet_type as u8);
        buf.put_u32(self.sequence);
        buf.put_u32(self.timestamp);
        buf.put_slice(self.channel_id.as_bytes());
        buf.put_slice(self.participant_id.as_bytes());
        buf.put_u8(self.flags.bits());
        buf.put_u8(self.reserved);
        buf.put_u16(self.payload.len() as u16);
        buf.put_slice(&self.payload);

        let crc = checksum::crc32(&buf[start..]);
        buf.put_u32(crc);
    }

    /// Decodes a single datagram.
    ///
    /// Rejection causes, checked in order:
    /// 1. fewer than [`MIN_PACKET_SIZE`] bytes;
    /// 2. bad magic;
    /// 3. unknown version;
    /// 4. unknown packet type;
    /// 5. declared payload length over [`MAX_PAYLOAD_SIZE`];
    /// 6. fewer than `payload_len + 4` bytes after the header;
    /// 7. trailing CRC does not match header ‖ payload;
    /// 8. bytes left over after the CRC (the frame would not re-encode
    ///    to the input).
    ///
    /// The input slice is never consumed, so a rejected datagram can still
    /// be logged by length at the call site.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < MIN_PACKET_SIZE {
            return Err(PacketError::TooShort {
                need: MIN_PACKET_SIZE,
                have: data.len(),
            });
        }

        let mut cursor = data;

        let magic = cursor.get_u32();
        if magic != PACKET_MAGIC {
            return Err(PacketError::BadMagic(magic));
        }

        let version = cursor.get_u8();
        if version != PROTOCOL_VERSION {
            return Err(PacketError::UnsupportedVersion(version));
        }

        let type_byte = cursor.get_u8();
        let packet_type =
            PacketType::from_wire(type_byte).ok_or(PacketError::InvalidType(type_byte))?;

        let sequence = cursor.get_u32();
        let timestamp = cursor.get_u32();

        let mut channel_bytes = [0u8; 16];
        cursor.copy_to_slice(&mut channel_bytes);
        let mut participant_bytes = [0u8; 16];
        cursor.copy_to_slice(&mut participant_bytes);

        let flags = PacketFlags::from_bits_retain(cursor.get_u8());
        let reserved = cursor.get_u8();

        let payload_len = cursor.get_u16();
        if payload_len as usize > MAX_PAYLOAD_SIZE {
            return Err(PacketError::PayloadTooLarge(payload_len));
        }

        let frame_len = HEADER_SIZE + payload_len as usize + CRC_SIZE;
        if data.len() < frame_len {
            return Err(PacketError::Truncated {
                need: frame_len,
                have: data.len(),
            });
        }

        let payload = Bytes::copy_from_slice(&cursor[..payload_len as usize]);
        cursor.advance(payload_len as usize);

        let computed = checksum::crc32(&data[..HEADER_SIZE + payload_len as usize]);
        let expected = cursor.get_u32();
        if expected != computed {
            return Err(PacketError::ChecksumMismatch { expected, computed });
        }

        if data.len() > frame_len {
            return Err(PacketError::TrailingBytes(data.len() - frame_len));
        }

        Ok(Self {
            packet_type,
            sequence,
            timestamp,
            channel_id: Uuid::from_bytes(channel_bytes),
            participant_id: Uuid::from_bytes(participant_bytes),
            flags,
            reserved,
            payload,
        })
    }

    /// Returns the total encoded size of this packet.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        MIN_PACKET_SIZE + self.payload.len()
    }

    /// Checks whether the sender marked this packet as carrying speech.
    #[inline]
    pub fn is_vox_active(&self) -> bool {
        self.flags.contains(PacketFlags::VOX_ACTIVE)
    }

    /// Checks whether the sender claims admin status.
    #[inline]
    pub fn claims_admin(&self) -> bool {
        self.flags.contains(PacketFlags::ADMIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet(payload: &'static [u8]) -> Packet {
        Packet::new(
            PacketType::Audio,
            7,
            42,
            Uuid::new_v4(),
            Uuid::new_v4(),
            PacketFlags::VOX_ACTIVE,
            Bytes::from_static(payload),
        )
    }

    #[test]
    fn test_roundtrip() {
        let packet = sample_packet(b"opus frame data");
        let bytes = packet.encode();
        let decoded = Packet::decode(&bytes).expect("decode failed");
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_bytes_roundtrip() {
        // Accepted bytes re-encode to the identical byte sequence.
        let packet = sample_packet(b"payload");
        let bytes = packet.encode();
        let reencoded = Packet::decode(&bytes).unwrap().encode();
        assert_eq!(bytes, reencoded);
    }

    #[test]
    fn test_empty_payload() {
        let packet = sample_packet(b"");
        let bytes = packet.encode();
        assert_eq!(bytes.len(), MIN_PACKET_SIZE);

        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded.payload.len(), 0);
    }

    #[test]
    fn test_max_payload_roundtrip() {
        let payload = vec![0xAB; MAX_PAYLOAD_SIZE];
        let mut packet = sample_packet(b"");
        packet.payload = Bytes::from(payload);

        let bytes = packet.encode();
        assert_eq!(bytes.len(), MAX_PACKET_SIZE);
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_too_short() {
        let packet = sample_packet(b"");
        let bytes = packet.encode();

        for len in 0..MIN_PACKET_SIZE {
            let result = Packet::decode(&bytes[..len]);
            assert!(
                matches!(result, Err(PacketError::TooShort { .. })),
                "length {} not rejected",
                len
            );
        }
    }

    #[test]
    fn test_truncated_payload() {
        let packet = sample_packet(b"twelve bytes");
        let bytes = packet.encode();

        // Every length between the bare minimum and one short of the full
        // frame must be rejected without touching the input.
        for len in MIN_PACKET_SIZE..bytes.len() {
            let result = Packet::decode(&bytes[..len]);
            assert!(
                matches!(result, Err(PacketError::Truncated { .. })),
                "length {} not rejected",
                len
            );
        }
    }

    #[test]
    fn test_bad_magic() {
        let packet = sample_packet(b"x");
        let mut bytes = BytesMut::from(&packet.encode()[..]);
        bytes[0] = 0x00;

        assert!(matches!(
            Packet::decode(&bytes),
            Err(PacketError::BadMagic(_))
        ));
    }

    #[test]
    fn test_unknown_version() {
        let packet = sample_packet(b"x");
        let mut bytes = BytesMut::from(&packet.encode()[..]);
        bytes[4] = 0x02;

        assert!(matches!(
            Packet::decode(&bytes),
            Err(PacketError::UnsupportedVersion(0x02))
        ));
    }

    #[test]
    fn test_unknown_type() {
        let packet = sample_packet(b"x");
        let mut bytes = BytesMut::from(&packet.encode()[..]);
        bytes[5] = 0x04;

        assert!(matches!(
            Packet::decode(&bytes),
            Err(PacketError::InvalidType(0x04))
        ));
    }

    #[test]
    fn test_oversized_declared_payload() {
        let packet = sample_packet(b"x");
        let mut bytes = BytesMut::from(&packet.encode()[..]);
        // Declared length 2049, one over the cap.
        bytes[48] = 0x08;
        bytes[49] = 0x01;

        assert!(matches!(
            Packet::decode(&bytes),
            Err(PacketError::PayloadTooLarge(2049))
        ));
    }

    #[test]
    fn test_every_bit_flip_rejected() {
        let packet = sample_packet(b"bitflip");
        let encoded = packet.encode();

        for byte_idx in 0..encoded.len() {
            for bit in 0..8 {
                let mut corrupted = BytesMut::from(&encoded[..]);
                corrupted[byte_idx] ^= 1 << bit;
                assert!(
                    Packet::decode(&corrupted).is_err(),
                    "flip at byte {} bit {} accepted",
                    byte_idx,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let packet = sample_packet(b"x");
        let mut bytes = BytesMut::from(&packet.encode()[..]);
        bytes.put_u8(0xFF);

        assert!(matches!(
            Packet::decode(&bytes),
            Err(PacketError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_unknown_flag_bits_preserved() {
        let mut packet = sample_packet(b"flags");
        packet.flags = PacketFlags::from_bits_retain(0b1010_0101);

        let bytes = packet.encode();
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded.flags.bits(), 0b1010_0101);
        assert!(decoded.flags.contains(PacketFlags::VOX_ACTIVE));
        assert!(decoded.flags.contains(PacketFlags::ADMIN));
    }

    #[test]
    fn test_reserved_byte_roundtrip() {
        let mut packet = sample_packet(b"reserved");
        packet.reserved = 0x7F;

        let decoded = Packet::decode(&packet.encode()).unwrap();
        assert_eq!(decoded.reserved, 0x7F);
    }

    #[test]
    fn test_all_packet_types() {
        for packet_type in [PacketType::Audio, PacketType::Control, PacketType::Heartbeat] {
            let mut packet = sample_packet(b"t");
            packet.packet_type = packet_type;

            let decoded = Packet::decode(&packet.encode()).unwrap();
            assert_eq!(decoded.packet_type, packet_type);
        }
    }

    #[test]
    fn test_type_from_wire() {
        assert_eq!(PacketType::from_wire(0x01), Some(PacketType::Audio));
        assert_eq!(PacketType::from_wire(0x02), Some(PacketType::Control));
        assert_eq!(PacketType::from_wire(0x03), Some(PacketType::Heartbeat));
        assert_eq!(PacketType::from_wire(0x00), None);
        assert_eq!(PacketType::from_wire(0xFF), None);
    }
}
