//! Collaborator interfaces.
//!
//! The bridge discovers nothing at runtime: every collaborator is
//! constructor-injected as a trait object. The game server host implements
//! these against its own command dispatcher, player manager, moderation and
//! broadcast facilities; the platform adapter implements the session traits
//! against the external chat platform's client library.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::{DispatchError, PlatformError};
use crate::identity::CommandContext;
use crate::protocol::{ChannelId, ChatReceiveMode, PlatformEvent};

// ── Game Server Collaborators ─────────────────────────────────────────────────

/// The host's command dispatcher. Owns the authoritative command registry
/// and the in-game command prefix.
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    /// The prefix marking a game-side chat line as a command invocation.
    fn command_prefix(&self) -> &str;

    /// Whether `name` is a registered command.
    fn has_command(&self, name: &str) -> bool;

    /// Run a registered command under the given synthetic identity.
    /// Output the command produces must go through `ctx.reply`, which
    /// targets the channel the command originated from.
    async fn run_command(
        &self,
        name: &str,
        ctx: CommandContext,
        args: &[String],
    ) -> Result<(), DispatchError>;
}

/// A rank's permission set and ordering weight, as recorded in the host's
/// rank table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankInfo {
    pub permissions: HashSet<String>,
    pub priority: i64,
}

/// The host's player/rank manager, reduced to the one lookup the bridge
/// needs.
pub trait RankRegistry: Send + Sync {
    /// Look up a rank by (lowercased) name.
    fn rank(&self, name: &str) -> Option<RankInfo>;
}

/// The host's chat-moderation facility.
pub trait ChatModeration: Send + Sync {
    fn is_muted(&self, alias: &str) -> bool;
}

/// The host's game-wide broadcast facility.
#[async_trait]
pub trait GameBroadcast: Send + Sync {
    async fn broadcast(&self, text: &str, mode: ChatReceiveMode);
}

/// An optional secondary bridge (e.g. IRC) mirroring guild chat.
#[async_trait]
pub trait SecondaryRelay: Send + Sync {
    async fn write(&self, text: &str);
}

// ── Platform Session ──────────────────────────────────────────────────────────

/// Factory for platform sessions. `connect` covers login + connect; the
/// wire protocol behind it is entirely the adapter's concern.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn connect(&self, token: &str) -> Result<PlatformSession, PlatformError>;
}

/// A live platform session, split into its outbound and inbound halves so
/// the supervisor can drive both concurrently.
pub struct PlatformSession {
    pub sink: Box<dyn PlatformSink>,
    pub events: Box<dyn PlatformEvents>,
}

/// Outbound half of a platform session.
#[async_trait]
pub trait PlatformSink: Send {
    /// Whether the session can see the given channel ID.
    fn resolve_channel(&self, id: ChannelId) -> bool;

    /// Deliver one message to a channel. A returned error is a session
    /// fault: the supervisor logs it and reconnects.
    async fn send(&mut self, channel: ChannelId, text: &str) -> Result<(), PlatformError>;
}

/// Inbound half of a platform session.
#[async_trait]
pub trait PlatformEvents: Send {
    /// Next event from the platform, or `None` when the stream has closed.
    async fn next(&mut self) -> Option<PlatformEvent>;
}
