//! Moderation commands carried in control packets.
//!
//! A control payload is a single command byte, followed for admin commands
//! by the 16-byte target participant id:
//! - LEAVE: any participant removes itself, no authorization needed
//! - MUTE / UNMUTE / KICK: admin-only, acknowledged with a targeted notice
//!
//! Notices are control packets sent to the target's last-seen address only;
//! they are never fanned out.

use crate::packet::{Packet, PacketFlags, PacketType};
use crate::{ChannelId, ParticipantId};
use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

/// Command bytes (first payload byte of an inbound control packet)
pub mod commands {
    /// Sender removes itself from the channel; no authorization required
    pub const LEAVE: u8 = 0x30;

    /// Mute the target participant (admin only)
    pub const MUTE: u8 = 0x01;

    /// Unmute the target participant (admin only)
    pub const UNMUTE: u8 = 0x02;

    /// Kick the target participant out of the channel (admin only)
    pub const KICK: u8 = 0x03;
}

/// Notice bytes (first payload byte of a targeted admin response)
pub mod notices {
    /// Target has been muted
    pub const MUTED: u8 = 0x10;

    /// Target has been unmuted
    pub const UNMUTED: u8 = 0x11;

    /// Target has been kicked
    pub const KICKED: u8 = 0x12;
}

/// Byte length of an admin command payload: command byte plus target id.
pub const ADMIN_COMMAND_LEN: usize = 17;

/// A parsed control payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Sender removes itself from the channel
    Leave,

    /// Mute the target participant
    Mute { target: ParticipantId },

    /// Unmute the target participant
    Unmute { target: ParticipantId },

    /// Kick the target participant out of the channel
    Kick { target: ParticipantId },

    /// Unrecognized command byte; dropped by the relay
    Unknown(u8),
}

impl ControlCommand {
    /// Parses a control payload.
    ///
    /// Returns `None` when the payload is empty, or when a command other
    /// than leave is shorter than [`ADMIN_COMMAND_LEN`] — everything but
    /// leave carries a target id.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let (&command, _) = payload.split_first()?;
        if command == commands::LEAVE {
            return Some(ControlCommand::Leave);
        }

        let target = target_id(payload)?;
        Some(match command {
            commands::MUTE => ControlCommand::Mute { target },
            commands::UNMUTE => ControlCommand::Unmute { target },
            commands::KICK => ControlCommand::Kick { target },
            other => ControlCommand::Unknown(other),
        })
    }

    /// Whether the relay demands sticky admin status for this command.
    ///
    /// Only leave is exempt: a participant may always remove itself.
    pub fn requires_admin(&self) -> bool {
        !matches!(self, ControlCommand::Leave)
    }
}

/// Extracts the target participant id from an admin command payload.
///
/// Returns `None` when the payload is shorter than [`ADMIN_COMMAND_LEN`].
pub fn target_id(payload: &[u8]) -> Option<ParticipantId> {
    let bytes: [u8; 16] = payload.get(1..ADMIN_COMMAND_LEN)?.try_into().ok()?;
    Some(Uuid::from_bytes(bytes))
}

/// Builds the targeted notice acknowledging an admin command.
///
/// The notice is a control packet from the acting admin: zero sequence and
/// timestamp, admin flag set, payload `[notice] ‖ target`. It is written to
/// the target's last-seen address only.
pub fn admin_notice(
    channel_id: ChannelId,
    admin_id: ParticipantId,
    notice: u8,
    target: ParticipantId,
) -> Packet {
    let mut payload = BytesMut::with_capacity(ADMIN_COMMAND_LEN);
    payload.put_u8(notice);
    payload.put_slice(target.as_bytes());

    Packet::new(
        PacketType::Control,
        0,
        0,
        channel_id,
        admin_id,
        PacketFlags::ADMIN,
        payload.freeze(),
    )
}

/// Builds the payload of an admin command packet.
///
/// Clients use this to issue mute/unmute/kick; the relay itself only parses.
pub fn admin_command(command: u8, target: ParticipantId) -> Bytes {
    let mut payload = BytesMut::with_capacity(ADMIN_COMMAND_LEN);
    payload.put_u8(command);
    payload.put_slice(target.as_bytes());
    payload.freeze()
}

/// Builds the payload of a leave command packet.
pub fn leave_command() -> Bytes {
    Bytes::from_static(&[commands::LEAVE])
}
