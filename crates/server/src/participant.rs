//! Per-peer state.
//!
//! A participant record is created on the first heartbeat or audio packet
//! that references it and lives until explicit leave, admin kick, or the
//! staleness sweep. All time-sensitive operations take `now` from the
//! caller; the dispatcher samples the monotonic clock once per datagram,
//! which keeps these pure functions of state plus `now` and immune to
//! wall-clock jumps.

use std::net::SocketAddr;
use std::time::{Duration, Instant};
use throttletalk_protocol::{PacketFlags, ParticipantId};

/// Packets allowed per rate-limit window.
pub const RATE_LIMIT_MAX_PACKETS: u32 = 60;

/// Width of the fixed rate-limit window.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(1);

/// A channel member as seen by the relay
#[derive(Debug, Clone)]
pub struct Participant {
    /// Identity, unique within the channel
    pub id: ParticipantId,

    /// Last-seen source address; rewritten on every packet (NAT rebinding)
    pub remote_addr: SocketAddr,

    /// Monotonic instant of the last heartbeat or audio packet
    pub last_heartbeat: Instant,

    /// Flags as last published by the participant
    pub flags: PacketFlags,

    /// Start of the current rate-limit window
    window_start: Instant,

    /// Packets counted in the current window
    window_count: u32,
}

impl Participant {
    /// Creates a fresh record with an open rate-limit window.
    pub fn new(id: ParticipantId, remote_addr: SocketAddr, now: Instant) -> Self {
        Self {
            id,
            remote_addr,
            last_heartbeat: now,
            flags: PacketFlags::empty(),
            window_start: now,
            window_count: 0,
        }
    }

    /// Whether the participant has heartbeat within `timeout`.
    pub fn is_alive(&self, timeout: Duration, now: Instant) -> bool {
        now.duration_since(self.last_heartbeat) < timeout
    }

    /// Marks the participant as seen now.
    pub fn update_heartbeat(&mut self, now: Instant) {
        self.last_heartbeat = now;
    }

    /// Counts one packet against the fixed window.
    ///
    /// Returns `true` while the participant stays within
    /// [`RATE_LIMIT_MAX_PACKETS`] per [`RATE_LIMIT_WINDOW`]; a window older
    /// than the width is reset with this packet as its first.
    pub fn check_rate_limit(&mut self, now: Instant) -> bool {
        if now.duration_since(self.window_start) >= RATE_LIMIT_WINDOW {
            self.window_start = now;
            self.window_count = 1;
            true
        } else {
            self.window_count += 1;
            self.window_count <= RATE_LIMIT_MAX_PACKETS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn test_liveness() {
        let now = Instant::now();
        let mut p = Participant::new(Uuid::new_v4(), addr(), now);
        let timeout = Duration::from_secs(10);

        assert!(p.is_alive(timeout, now));
        assert!(p.is_alive(timeout, now + Duration::from_secs(9)));
        assert!(!p.is_alive(timeout, now + Duration::from_secs(10)));

        p.update_heartbeat(now + Duration::from_secs(9));
        assert!(p.is_alive(timeout, now + Duration::from_secs(12)));
    }

    #[test]
    fn test_rate_limit_burst() {
        let now = Instant::now();
        let mut p = Participant::new(Uuid::new_v4(), addr(), now);

        // First 60 packets of a burst pass, the rest of the window is capped.
        for i in 0..RATE_LIMIT_MAX_PACKETS {
            assert!(p.check_rate_limit(now), "packet {} rejected", i);
        }
        for _ in 0..5 {
            assert!(!p.check_rate_limit(now));
        }
    }

    #[test]
    fn test_rate_limit_window_reset() {
        let now = Instant::now();
        let mut p = Participant::new(Uuid::new_v4(), addr(), now);

        for _ in 0..=RATE_LIMIT_MAX_PACKETS {
            p.check_rate_limit(now + Duration::from_millis(500));
        }
        assert!(!p.check_rate_limit(now + Duration::from_millis(999)));

        // One full window after the reset point the limiter opens again.
        assert!(p.check_rate_limit(now + Duration::from_millis(1500)));
    }

    #[test]
    fn test_rate_limit_spread_traffic_untouched() {
        let now = Instant::now();
        let mut p = Participant::new(Uuid::new_v4(), addr(), now);

        // 50 packets/s for three seconds never trips the limiter.
        for tick in 0..150u64 {
            let t = now + Duration::from_millis(tick * 20);
            assert!(p.check_rate_limit(t));
        }
    }
}
