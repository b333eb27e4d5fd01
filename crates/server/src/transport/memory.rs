use bytes::Bytes;
use std::net::SocketAddr;
use throttletalk_protocol::DatagramSink;

/// In-memory sink recording every frame handed to it.
///
/// Lets tests observe fan-out decisions (destinations, frame bytes, order)
/// without sockets.
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Frames in send order
    pub sent: Vec<(SocketAddr, Bytes)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames sent to `addr`, in order.
    pub fn frames_to(&self, addr: SocketAddr) -> Vec<Bytes> {
        self.sent
            .iter()
            .filter(|(dest, _)| *dest == addr)
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.sent.clear();
    }
}

impl DatagramSink for MemorySink {
    fn send(&mut self, addr: SocketAddr, frame: &[u8]) {
        self.sent.push((addr, Bytes::copy_from_slice(frame)));
    }
}
