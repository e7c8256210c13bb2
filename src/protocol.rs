//! Boundary data types.
//!
//! Everything that crosses a task boundary lives here: game-side chat
//! events fed in by the host, guild-side events produced by the platform
//! client, and the outbound messages queued at the supervisor.

use serde::{Deserialize, Serialize};

/// Numeric ID of a channel on the external platform.
pub type ChannelId = u64;

// ── Game Side ─────────────────────────────────────────────────────────────────

/// Where a game-side chat message was addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatSendMode {
    /// Server-wide chat. Only these are relayed to the guild channel.
    Universe,
    /// Local/world chat.
    Local,
    /// Party chat.
    Party,
}

/// How a broadcast into the game should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatReceiveMode {
    Broadcast,
    Whisper,
}

/// A chat message observed on the game server's event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameChat {
    pub message: String,
    pub send_mode: ChatSendMode,
}

/// A player join/leave event, announced to the guild channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEvent {
    Joined,
    Left,
}

impl std::fmt::Display for PresenceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PresenceEvent::Joined => write!(f, "joined"),
            PresenceEvent::Left => write!(f, "left"),
        }
    }
}

// ── Guild Side ────────────────────────────────────────────────────────────────

/// A role held by an external user, with its platform-defined priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    /// Platform ordering weight. Higher position wins during rank
    /// resolution.
    pub position: i64,
}

/// An external-platform identity, supplied per incoming message.
/// Ephemeral; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalUser {
    pub display_name: String,
    /// True for bot accounts, including the bridge's own. Used for echo
    /// suppression.
    pub is_bot: bool,
    pub roles: Vec<Role>,
}

/// A message received on the external platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalMessage {
    pub author: ExternalUser,
    pub channel: ChannelId,
    pub content: String,
}

/// Events surfaced by the platform session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformEvent {
    Message(ExternalMessage),
}

// ── Outbound ──────────────────────────────────────────────────────────────────

/// Destination for an outbound guild-channel send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendTarget {
    /// The bound main channel.
    Main,
    /// The bound staff channel, degrading to main if unresolved.
    Staff,
    /// An explicit channel — used for command replies, which go back to
    /// the channel the command originated from.
    Channel(ChannelId),
}

/// A message queued for delivery to the external platform.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub text: String,
    pub target: SendTarget,
}
