//! Frame integrity checksum.
//!
//! ThrottleTalk frames carry a trailing CRC32 over header and payload. The
//! variant is the ISO-3309 / zlib one: reflected, polynomial `0xEDB88320`,
//! initial value and final XOR `0xFFFFFFFF`.

/// Calculate the CRC32 checksum of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}
