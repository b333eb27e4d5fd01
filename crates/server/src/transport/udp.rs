use std::net::SocketAddr;
use std::sync::Arc;
use throttletalk_protocol::DatagramSink;
use tokio::net::UdpSocket;
use tracing::error;

/// Fire-and-forget sink over the relay's UDP socket.
///
/// Sends go through `try_send_to`: no completion is awaited, and a failed
/// write is logged and skipped so the fan-out loop survives arbitrary
/// recipient misbehavior.
pub struct UdpSink {
    socket: Arc<UdpSocket>,
}

impl UdpSink {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }
}

impl DatagramSink for UdpSink {
    fn send(&mut self, addr: SocketAddr, frame: &[u8]) {
        if let Err(err) = self.socket.try_send_to(frame, addr) {
            error!(%addr, %err, "udp send failed, recipient skipped");
        }
    }
}
