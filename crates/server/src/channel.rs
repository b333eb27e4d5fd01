//! A voice channel: participants, admins, fan-out.

use crate::participant::Participant;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use throttletalk_protocol::{ChannelId, PacketFlags, ParticipantId};

/// A collection of participants relaying audio to each other.
///
/// Channels are created lazily on first reference and removed as soon as
/// their participant map empties; an empty channel is never observable
/// across event-loop turns.
#[derive(Debug)]
pub struct VoiceChannel {
    /// Channel identity
    pub id: ChannelId,

    /// Members keyed by identity
    participants: HashMap<ParticipantId, Participant>,

    /// Sticky admin set; entries leave only with the participant record
    admin_ids: HashSet<ParticipantId>,

    /// Creation instant
    pub created_at: Instant,
}

impl VoiceChannel {
    pub fn new(id: ChannelId, now: Instant) -> Self {
        Self {
            id,
            participants: HashMap::new(),
            admin_ids: HashSet::new(),
            created_at: now,
        }
    }

    /// Inserts or replaces a participant by id.
    pub fn add_participant(&mut self, participant: Participant) {
        self.participants.insert(participant.id, participant);
    }

    /// Removes a participant; idempotent. Clears its admin entry so the
    /// admin set stays a subset of the member keys.
    pub fn remove_participant(&mut self, id: ParticipantId) -> Option<Participant> {
        self.admin_ids.remove(&id);
        self.participants.remove(&id)
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.participants.contains_key(&id)
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Refreshes a participant from a heartbeat: overwrite the last-seen
    /// address, stamp the heartbeat, and store the published flags.
    ///
    /// A heartbeat carrying the admin bit promotes the sender into the
    /// admin set. The promotion is sticky: later heartbeats without the
    /// bit do not demote, so a spoofed packet cannot strip a real admin.
    ///
    /// Returns `false` when the participant is unknown.
    pub fn update_participant(
        &mut self,
        id: ParticipantId,
        remote_addr: SocketAddr,
        flags: Option<PacketFlags>,
        now: Instant,
    ) -> bool {
        let Some(participant) = self.participants.get_mut(&id) else {
            return false;
        };

        participant.remote_addr = remote_addr;
        participant.update_heartbeat(now);

        if let Some(flags) = flags {
            participant.flags = flags;
            if flags.contains(PacketFlags::ADMIN) {
                self.admin_ids.insert(id);
            }
        }
        true
    }

    /// Whether `id` holds sticky admin status in this channel.
    pub fn is_admin(&self, id: ParticipantId) -> bool {
        self.admin_ids.contains(&id)
    }

    /// Counts a packet from `id` against its rate window.
    ///
    /// A missing participant fails the check; the packet is dropped.
    pub fn check_rate_limit(&mut self, id: ParticipantId, now: Instant) -> bool {
        match self.participants.get_mut(&id) {
            Some(participant) => participant.check_rate_limit(now),
            None => false,
        }
    }

    /// All participants except `sender` — the fan-out recipients.
    ///
    /// Ordering is unspecified but stable within one call.
    pub fn recipients(&self, sender: ParticipantId) -> impl Iterator<Item = &Participant> {
        self.participants
            .values()
            .filter(move |p| p.id != sender)
    }

    /// Evicts every participant whose heartbeat is older than `timeout`.
    ///
    /// Returns the evicted ids.
    pub fn remove_stale_participants(
        &mut self,
        timeout: Duration,
        now: Instant,
    ) -> Vec<ParticipantId> {
        let stale: Vec<ParticipantId> = self
            .participants
            .values()
            .filter(|p| !p.is_alive(timeout, now))
            .map(|p| p.id)
            .collect();

        for id in &stale {
            self.remove_participant(*id);
        }
        stale
    }
}
