//! Channel registry: the single owner of all relay state.
//!
//! Every method runs on the event-loop task; no locking exists anywhere in
//! the registry because nothing else may touch it. Join, leave, forward,
//! and the sweep each complete within one datagram turn, so an empty
//! channel is never observable by the next turn.

use crate::channel::VoiceChannel;
use crate::config::ServerConfig;
use crate::participant::Participant;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use throttletalk_protocol::{ChannelId, DatagramSink, Packet, ParticipantId};
use tracing::{debug, warn};

/// Owner of every channel the relay serves.
#[derive(Debug)]
pub struct ChannelRegistry {
    channels: HashMap<ChannelId, VoiceChannel>,

    /// Soft cap: exceeding it is logged, never enforced
    max_channels: usize,

    /// Hard cap per channel: exceeding joins are refused
    max_participants_per_channel: usize,

    heartbeat_timeout: Duration,
}

impl ChannelRegistry {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            channels: HashMap::new(),
            max_channels: config.max_channels,
            max_participants_per_channel: config.max_participants_per_channel,
            heartbeat_timeout: config.heartbeat_timeout,
        }
    }

    /// Returns the channel, creating it lazily on first reference.
    ///
    /// The channel cap is a soft cap: refusing to create a channel would
    /// silently partition newly-arriving clients, so overflow is logged
    /// and the channel is created anyway.
    pub fn get_or_create_channel(&mut self, id: ChannelId, now: Instant) -> &mut VoiceChannel {
        if !self.channels.contains_key(&id) && self.channels.len() >= self.max_channels {
            warn!(
                channel = %id,
                count = self.channels.len(),
                max = self.max_channels,
                "channel cap exceeded, creating anyway"
            );
        }
        self.channels
            .entry(id)
            .or_insert_with(|| VoiceChannel::new(id, now))
    }

    pub fn channel(&self, id: ChannelId) -> Option<&VoiceChannel> {
        self.channels.get(&id)
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> Option<&mut VoiceChannel> {
        self.channels.get_mut(&id)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Admits a participant into a channel, or refreshes it if present.
    ///
    /// Any data packet joins implicitly: heartbeats and audio both land
    /// here. An existing participant gets its address and heartbeat
    /// refreshed (NAT rebinding follows the most recent source address). A
    /// new participant is admitted only below the per-channel hard cap;
    /// over-capacity joins are refused silently, and the client retries
    /// via its next heartbeat.
    pub fn handle_join(
        &mut self,
        channel_id: ChannelId,
        participant_id: ParticipantId,
        remote_addr: SocketAddr,
        now: Instant,
    ) {
        let max_participants = self.max_participants_per_channel;
        let channel = self.get_or_create_channel(channel_id, now);

        if channel.update_participant(participant_id, remote_addr, None, now) {
            return;
        }

        if channel.participant_count() >= max_participants {
            warn!(
                channel = %channel_id,
                participant = %participant_id,
                max = max_participants,
                "channel full, join refused"
            );
            return;
        }

        debug!(channel = %channel_id, participant = %participant_id, %remote_addr, "participant joined");
        channel.add_participant(Participant::new(participant_id, remote_addr, now));
    }

    /// Removes a participant; drops the channel once it empties.
    pub fn handle_leave(&mut self, channel_id: ChannelId, participant_id: ParticipantId) {
        let Some(channel) = self.channels.get_mut(&channel_id) else {
            return;
        };

        if channel.remove_participant(participant_id).is_some() {
            debug!(channel = %channel_id, participant = %participant_id, "participant left");
        }
        if channel.is_empty() {
            self.channels.remove(&channel_id);
            debug!(channel = %channel_id, "empty channel removed");
        }
    }

    /// Fans a packet out to every other member of its channel.
    ///
    /// The frame is encoded once and written per recipient through `sink`.
    /// Returns the number of frames handed to the sink.
    pub fn forward(
        &self,
        packet: &Packet,
        sender: ParticipantId,
        sink: &mut dyn DatagramSink,
    ) -> usize {
        let Some(channel) = self.channels.get(&packet.channel_id) else {
            warn!(channel = %packet.channel_id, "forward to unknown channel dropped");
            return 0;
        };

        let frame = packet.encode();
        let mut sent = 0;
        for recipient in channel.recipients(sender) {
            sink.send(recipient.remote_addr, &frame);
            sent += 1;
        }
        sent
    }

    /// Evicts stale participants from every channel, then drops channels
    /// that emptied.
    ///
    /// Two passes: eviction walks each channel in place, and emptied
    /// channels are collected and removed afterwards rather than mutating
    /// the channel map mid-iteration.
    pub fn cleanup_stale_participants(&mut self, now: Instant) {
        let timeout = self.heartbeat_timeout;
        let mut emptied = Vec::new();

        for (id, channel) in &mut self.channels {
            let evicted = channel.remove_stale_participants(timeout, now);
            for participant in &evicted {
                debug!(channel = %id, participant = %participant, "stale participant evicted");
            }
            if channel.is_empty() {
                emptied.push(*id);
            }
        }

        for id in emptied {
            self.channels.remove(&id);
            debug!(channel = %id, "empty channel removed after sweep");
        }
    }
}
