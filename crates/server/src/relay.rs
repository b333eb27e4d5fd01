//! UDP event loop and per-datagram dispatcher.
//!
//! One task owns the socket, the registry, and the sweep timer; every
//! datagram runs decode → route → fan-out to completion without yielding,
//! which is why no lock exists anywhere in the relay. Outbound writes are
//! non-blocking and fire-and-forget.

use crate::config::ServerConfig;
use crate::registry::ChannelRegistry;
use crate::transport::UdpSink;
use socket2::{Domain, Protocol, Socket, Type};
use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use throttletalk_protocol::{
    control, ChannelId, ControlCommand, DatagramSink, Packet, PacketType, ParticipantId,
    MAX_PACKET_SIZE,
};
use tokio::net::UdpSocket;
use tokio::time::{interval_at, Instant as TokioInstant};
use tracing::{debug, error, info, trace, warn};

/// Startup errors; both are fatal and surface at the binary's exit.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid listen host {host:?}: {source}")]
    InvalidHost {
        host: String,
        source: std::net::AddrParseError,
    },

    #[error("failed to bind udp socket on {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
}

/// Relay traffic counters, snapshot-logged on every sweep tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayStats {
    /// Datagrams received, well-formed or not
    pub received: u64,

    /// Datagrams rejected by the codec
    pub malformed: u64,

    /// Frames handed to the sink during fan-out
    pub forwarded: u64,

    /// Well-formed packets dropped before fan-out (silence, rate limit,
    /// missing authority, unknown commands)
    pub dropped: u64,
}

/// The selective-forwarding relay: socket, registry, and stats under a
/// single event-loop task.
pub struct VoiceRelay {
    socket: Arc<UdpSocket>,
    sink: UdpSink,
    registry: ChannelRegistry,
    stats: RelayStats,
    config: ServerConfig,
}

impl VoiceRelay {
    /// Binds the relay socket with address-reuse enabled.
    pub async fn bind(config: ServerConfig) -> Result<Self, RelayError> {
        let ip: IpAddr = config.host.parse().map_err(|source| RelayError::InvalidHost {
            host: config.host.clone(),
            source,
        })?;
        let addr = SocketAddr::new(ip, config.port);

        let socket = bind_reuse(addr).map_err(|source| RelayError::Bind { addr, source })?;
        let socket = Arc::new(socket);
        info!(%addr, "udp socket bound");

        Ok(Self {
            sink: UdpSink::new(Arc::clone(&socket)),
            socket,
            registry: ChannelRegistry::new(&config),
            stats: RelayStats::default(),
            config,
        })
    }

    /// The socket's actual local address (useful when bound to port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Runs the relay until `shutdown` resolves.
    ///
    /// Suspends only between datagrams: waiting for the socket, the sweep
    /// tick, or the shutdown signal. The first sweep fires one full
    /// interval after start, not immediately. On shutdown the timer and
    /// socket are released with the relay and the loop exits cleanly.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);

        let period = self.config.heartbeat_interval;
        let mut sweep = interval_at(TokioInstant::now() + period, period);
        let mut buf = vec![0u8; MAX_PACKET_SIZE];

        info!(
            interval_secs = period.as_secs_f64(),
            timeout_secs = self.config.heartbeat_timeout.as_secs_f64(),
            "relay loop running"
        );

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => match result {
                    Ok((len, addr)) => self.handle_datagram(&buf[..len], addr, Instant::now()),
                    Err(err) => error!(%err, "udp receive error"),
                },

                _ = sweep.tick() => {
                    self.registry.cleanup_stale_participants(Instant::now());
                    debug!(
                        stats = ?self.stats,
                        channels = self.registry.channel_count(),
                        "sweep complete"
                    );
                }

                _ = &mut shutdown => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        info!(stats = ?self.stats, "relay stopped");
    }

    /// Decode → route one inbound datagram.
    fn handle_datagram(&mut self, data: &[u8], addr: SocketAddr, now: Instant) {
        self.stats.received += 1;

        let packet = match Packet::decode(data) {
            Ok(packet) => packet,
            Err(err) => {
                self.stats.malformed += 1;
                warn!(%addr, len = data.len(), %err, "malformed datagram dropped");
                return;
            }
        };

        match packet.packet_type {
            PacketType::Audio => self.handle_audio(&packet, addr, now),
            PacketType::Heartbeat => self.handle_heartbeat(&packet, addr, now),
            PacketType::Control => self.handle_control(&packet, addr),
        }
    }

    /// Audio: silence-suppressed at the edge, implicit join, rate-limited,
    /// then fanned out untouched.
    fn handle_audio(&mut self, packet: &Packet, addr: SocketAddr, now: Instant) {
        if !packet.is_vox_active() {
            trace!(participant = %packet.participant_id, "audio without VOX dropped");
            self.stats.dropped += 1;
            return;
        }

        let sender = packet.participant_id;
        self.registry.handle_join(packet.channel_id, sender, addr, now);

        let within_limit = self
            .registry
            .channel_mut(packet.channel_id)
            .is_some_and(|channel| channel.check_rate_limit(sender, now));
        if !within_limit {
            debug!(participant = %sender, "rate limit exceeded, audio dropped");
            self.stats.dropped += 1;
            return;
        }

        self.stats.forwarded += self.registry.forward(packet, sender, &mut self.sink) as u64;
    }

    /// Heartbeat: implicit join, presence/flags refresh (the only trusted
    /// admin-claim path), then fan-out so peers learn presence.
    fn handle_heartbeat(&mut self, packet: &Packet, addr: SocketAddr, now: Instant) {
        let sender = packet.participant_id;
        self.registry.handle_join(packet.channel_id, sender, addr, now);

        if let Some(channel) = self.registry.channel_mut(packet.channel_id) {
            channel.update_participant(sender, addr, Some(packet.flags), now);
        }

        self.stats.forwarded += self.registry.forward(packet, sender, &mut self.sink) as u64;
    }

    /// Control: self-leave needs no authority; everything else requires
    /// sticky admin status and answers with a targeted notice. The admin
    /// bit in the packet's own flags is never consulted — it is trivially
    /// forgeable.
    fn handle_control(&mut self, packet: &Packet, addr: SocketAddr) {
        let sender = packet.participant_id;

        let Some(command) = ControlCommand::parse(&packet.payload) else {
            debug!(%addr, len = packet.payload.len(), "unparseable control payload dropped");
            self.stats.dropped += 1;
            return;
        };

        if command.requires_admin() {
            let is_admin = self
                .registry
                .channel(packet.channel_id)
                .is_some_and(|channel| channel.is_admin(sender));
            if !is_admin {
                warn!(
                    participant = %sender,
                    channel = %packet.channel_id,
                    ?command,
                    "control command without admin status dropped"
                );
                self.stats.dropped += 1;
                return;
            }
        }

        match command {
            ControlCommand::Leave => self.registry.handle_leave(packet.channel_id, sender),
            ControlCommand::Mute { target } => {
                self.send_admin_notice(packet.channel_id, sender, control::notices::MUTED, target);
            }
            ControlCommand::Unmute { target } => {
                self.send_admin_notice(packet.channel_id, sender, control::notices::UNMUTED, target);
            }
            ControlCommand::Kick { target } => {
                self.send_admin_notice(packet.channel_id, sender, control::notices::KICKED, target);
                self.registry.handle_leave(packet.channel_id, target);
            }
            ControlCommand::Unknown(byte) => {
                debug!(command = byte, "unknown control command dropped");
                self.stats.dropped += 1;
            }
        }
    }

    /// Writes a targeted notice to the target's last-seen address only;
    /// notices are never fanned out. A target that is not a member leaves
    /// nobody to notify.
    fn send_admin_notice(
        &mut self,
        channel_id: ChannelId,
        admin: ParticipantId,
        notice: u8,
        target: ParticipantId,
    ) {
        let target_addr = self
            .registry
            .channel(channel_id)
            .and_then(|channel| channel.participant(target))
            .map(|participant| participant.remote_addr);
        let Some(target_addr) = target_addr else {
            debug!(target = %target, "admin command for unknown target dropped");
            self.stats.dropped += 1;
            return;
        };

        let response = control::admin_notice(channel_id, admin, notice, target);
        self.sink.send(target_addr, &response.encode());
    }
}

fn bind_reuse(addr: SocketAddr) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;
    use throttletalk_protocol::{ChannelId, PacketFlags, ParticipantId};
    use uuid::Uuid;

    async fn test_relay() -> VoiceRelay {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..ServerConfig::default()
        };
        VoiceRelay::bind(config).await.expect("bind failed")
    }

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn heartbeat(channel: ChannelId, sender: ParticipantId, flags: PacketFlags) -> Bytes {
        Packet::new(PacketType::Heartbeat, 0, 0, channel, sender, flags, Bytes::new()).encode()
    }

    fn audio(channel: ChannelId, sender: ParticipantId) -> Bytes {
        Packet::new(
            PacketType::Audio,
            0,
            0,
            channel,
            sender,
            PacketFlags::VOX_ACTIVE,
            Bytes::from_static(b"frame"),
        )
        .encode()
    }

    fn ctrl(channel: ChannelId, sender: ParticipantId, payload: Bytes) -> Bytes {
        Packet::new(
            PacketType::Control,
            0,
            0,
            channel,
            sender,
            PacketFlags::empty(),
            payload,
        )
        .encode()
    }

    #[tokio::test]
    async fn test_malformed_datagram_counted() {
        let mut relay = test_relay().await;
        let now = Instant::now();

        relay.handle_datagram(b"garbage", addr(5000), now);
        relay.handle_datagram(&[0u8; 60], addr(5000), now);

        let stats = relay.stats();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.malformed, 2);
        assert_eq!(relay.registry().channel_count(), 0);
    }

    #[tokio::test]
    async fn test_heartbeat_joins_channel() {
        let mut relay = test_relay().await;
        let channel = Uuid::new_v4();
        let sender = Uuid::new_v4();

        relay.handle_datagram(
            &heartbeat(channel, sender, PacketFlags::empty()),
            addr(5000),
            Instant::now(),
        );

        let stored = relay.registry().channel(channel).expect("channel missing");
        assert!(stored.contains(sender));
        assert_eq!(stored.participant(sender).unwrap().remote_addr, addr(5000));
    }

    #[tokio::test]
    async fn test_audio_without_vox_dropped() {
        let mut relay = test_relay().await;
        let channel = Uuid::new_v4();
        let sender = Uuid::new_v4();

        let silent = Packet::new(
            PacketType::Audio,
            0,
            0,
            channel,
            sender,
            PacketFlags::empty(),
            Bytes::from_static(b"frame"),
        )
        .encode();
        relay.handle_datagram(&silent, addr(5000), Instant::now());

        // Dropped before the implicit join: no channel appears.
        assert_eq!(relay.registry().channel_count(), 0);
        assert_eq!(relay.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_audio_joins_and_forwards() {
        let mut relay = test_relay().await;
        let channel = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let now = Instant::now();

        relay.handle_datagram(&heartbeat(channel, b, PacketFlags::empty()), addr(5001), now);
        relay.handle_datagram(&audio(channel, a), addr(5000), now);

        assert!(relay.registry().channel(channel).unwrap().contains(a));
        assert_eq!(relay.stats().forwarded, 1);
    }

    #[tokio::test]
    async fn test_audio_rate_limit() {
        let mut relay = test_relay().await;
        let channel = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let now = Instant::now();

        relay.handle_datagram(&heartbeat(channel, b, PacketFlags::empty()), addr(5001), now);

        // 65 packets inside one window: 60 forwarded, 5 dropped.
        let frame = audio(channel, a);
        for _ in 0..65 {
            relay.handle_datagram(&frame, addr(5000), now + Duration::from_millis(100));
        }

        assert_eq!(relay.stats().forwarded, 60);
        assert_eq!(relay.stats().dropped, 5);

        // A fresh window admits the sender again.
        relay.handle_datagram(&frame, addr(5000), now + Duration::from_millis(1200));
        assert_eq!(relay.stats().forwarded, 61);
    }

    #[tokio::test]
    async fn test_control_leave() {
        let mut relay = test_relay().await;
        let channel = Uuid::new_v4();
        let sender = Uuid::new_v4();
        let now = Instant::now();

        relay.handle_datagram(&heartbeat(channel, sender, PacketFlags::empty()), addr(5000), now);
        assert_eq!(relay.registry().channel_count(), 1);

        relay.handle_datagram(&ctrl(channel, sender, control::leave_command()), addr(5000), now);
        assert_eq!(relay.registry().channel_count(), 0);
    }

    #[tokio::test]
    async fn test_kick_requires_sticky_admin() {
        let mut relay = test_relay().await;
        let channel = Uuid::new_v4();
        let admin = Uuid::new_v4();
        let target = Uuid::new_v4();
        let now = Instant::now();

        relay.handle_datagram(&heartbeat(channel, admin, PacketFlags::empty()), addr(5000), now);
        relay.handle_datagram(&heartbeat(channel, target, PacketFlags::empty()), addr(5001), now);

        // The admin flag on the control packet itself carries no authority.
        let kick = Packet::new(
            PacketType::Control,
            0,
            0,
            channel,
            admin,
            PacketFlags::ADMIN,
            control::admin_command(control::commands::KICK, target),
        )
        .encode();
        relay.handle_datagram(&kick, addr(5000), now);
        assert!(relay.registry().channel(channel).unwrap().contains(target));

        // After an admin-flagged heartbeat the same kick goes through.
        relay.handle_datagram(&heartbeat(channel, admin, PacketFlags::ADMIN), addr(5000), now);
        relay.handle_datagram(&kick, addr(5000), now);
        assert!(!relay.registry().channel(channel).unwrap().contains(target));
    }

    #[tokio::test]
    async fn test_unknown_control_command_dropped() {
        let mut relay = test_relay().await;
        let channel = Uuid::new_v4();
        let admin = Uuid::new_v4();
        let target = Uuid::new_v4();
        let now = Instant::now();

        relay.handle_datagram(&heartbeat(channel, admin, PacketFlags::ADMIN), addr(5000), now);
        relay.handle_datagram(&heartbeat(channel, target, PacketFlags::empty()), addr(5001), now);

        let bogus = ctrl(channel, admin, control::admin_command(0x7F, target));
        let dropped_before = relay.stats().dropped;
        relay.handle_datagram(&bogus, addr(5000), now);

        assert_eq!(relay.stats().dropped, dropped_before + 1);
        assert!(relay.registry().channel(channel).unwrap().contains(target));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let relay = test_relay().await;
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(relay.run(async {
            let _ = rx.await;
        }));

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("relay did not stop")
            .expect("relay task panicked");
    }
}
