use thiserror::Error;

/// Reasons a datagram fails to decode as a ThrottleTalk packet.
///
/// Rejection is silent at the codec layer; the dispatcher counts and logs
/// malformed frames. Variants carry the offending values for diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("datagram too short: need {need} bytes, have {have}")]
    TooShort { need: usize, have: usize },

    #[error("bad magic: {0:#010x}")]
    BadMagic(u32),

    #[error("unsupported protocol version: {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("invalid packet type: {0:#04x}")]
    InvalidType(u8),

    #[error("declared payload length {0} exceeds maximum")]
    PayloadTooLarge(u16),

    #[error("truncated frame: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),

    #[error("checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },
}

/// Result type for packet codec operations.
pub type Result<T> = std::result::Result<T, PacketError>;
