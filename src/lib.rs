//! # ThrottleTalk
//!
//! A stateless selective-forwarding unit for real-time voice chat over UDP:
//! - Fixed-layout CRC-framed packets (audio, control, heartbeat)
//! - Channel/participant registry with heartbeat-driven presence
//! - In-band moderation (mute / unmute / kick / leave) with sticky admins
//! - Per-participant fixed-window rate limiting
//!
//! ## Components
//!
//! - `throttletalk-protocol`: wire format, checksum, moderation commands
//! - `throttletalk-server`: registry, UDP event loop, and the
//!   `throttletalk-server` binary

pub use throttletalk_protocol as protocol;
pub use throttletalk_server as server;
