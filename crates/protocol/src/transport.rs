//! Transport seam for outbound datagrams.
//!
//! The relay encodes each forwarded packet once and hands the frame to a
//! [`DatagramSink`] per recipient. Keeping the seam a trait lets the fan-out
//! logic run against a real UDP socket in production and an in-memory
//! recorder in tests.

use std::net::SocketAddr;

/// Destination-addressed frame writer.
///
/// Sends are best-effort fire-and-forget: implementations must not block
/// and must swallow per-recipient failures (logging them is their
/// business), so one unreachable peer never stalls the fan-out.
pub trait DatagramSink {
    /// Writes one frame to `addr`.
    fn send(&mut self, addr: SocketAddr, frame: &[u8]);
}
