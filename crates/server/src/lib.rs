//! # ThrottleTalk Server
//!
//! Selective-forwarding relay for ThrottleTalk voice channels.
//!
//! One event-loop task owns the UDP socket and the channel registry:
//! inbound datagrams are decoded, routed by type, and fanned out to the
//! other members of the sender's channel without mixing or transcoding.
//! A periodic sweep evicts participants whose heartbeats have gone stale.
//!
//! ## Example
//!
//! ```no_run
//! use throttletalk_server::{ServerConfig, VoiceRelay};
//!
//! #[tokio::main]
//! async fn main() {
//!     let relay = VoiceRelay::bind(ServerConfig::default()).await.unwrap();
//!     relay.run(std::future::pending()).await;
//! }
//! ```

pub mod channel;
pub mod config;
pub mod participant;
pub mod registry;
pub mod relay;
pub mod transport;

pub use channel::VoiceChannel;
pub use config::{ConfigError, ServerConfig};
pub use participant::{Participant, RATE_LIMIT_MAX_PACKETS, RATE_LIMIT_WINDOW};
pub use registry::ChannelRegistry;
pub use relay::{RelayError, RelayStats, VoiceRelay};
pub use transport::{MemorySink, UdpSink};
