//! Synthetic identity for external users.
//!
//! Command handlers expect an authenticated in-game session. The identity
//! adaptor fabricates one: a fresh [`SyntheticIdentity`] is built for every
//! dispatch from the invoking external user plus their resolved
//! permissions, so concurrent dispatches can never observe each other's
//! permission or alias values. The `synthetic` marker lets downstream code
//! special-case persistence — this player must never be written to the
//! player database.

use std::collections::HashSet;

use crate::permissions::Resolved;
use crate::protocol::{ChannelId, ExternalUser, SendTarget};
use crate::relay::strip_color_markup;
use crate::supervisor::BridgeWriter;

/// Permission granting unconditional access to every command.
pub const ALL_PERMS: &str = "special.allperms";

/// A fabricated in-game session identity standing in for an external user.
#[derive(Debug, Clone)]
pub struct SyntheticIdentity {
    pub name: String,
    pub alias: String,
    pub permissions: HashSet<String>,
    pub priority: i64,
    /// Per-player permission overrides. Always empty for synthetic
    /// identities; present so `perm_check` matches real-player semantics.
    pub granted_perms: HashSet<String>,
    pub revoked_perms: HashSet<String>,
    /// Synthetic sessions are always "logged in".
    pub logged_in: bool,
    /// Marks this identity as non-real so it is never persisted.
    pub synthetic: bool,
}

impl SyntheticIdentity {
    /// Build a fresh identity for one command dispatch: the external
    /// user's display name under their resolved rank's permissions.
    /// Infallible.
    pub fn bind(user: &ExternalUser, resolved: &Resolved) -> Self {
        Self {
            name: user.display_name.clone(),
            alias: user.display_name.clone(),
            permissions: resolved.permissions.clone(),
            priority: resolved.priority,
            granted_perms: HashSet::new(),
            revoked_perms: HashSet::new(),
            logged_in: true,
            synthetic: true,
        }
    }

    /// Permission check with real-player semantics: an empty requirement
    /// always passes, `special.allperms` passes everything, revocations
    /// beat the rank's base set.
    pub fn perm_check(&self, perm: &str) -> bool {
        if perm.is_empty() {
            return true;
        }
        if self.permissions.contains(ALL_PERMS) {
            return true;
        }
        let perm = perm.to_lowercase();
        if self.revoked_perms.contains(&perm) {
            return false;
        }
        self.permissions.contains(&perm)
    }
}

/// Per-dispatch reply target.
///
/// Output a command writes back is redirected to the channel the command
/// originated from, for the duration of that single dispatch. Each call
/// gets its own sink, so overlapping commands cannot race on a shared
/// reply target.
#[derive(Clone)]
pub struct ReplySink {
    writer: BridgeWriter,
    origin: ChannelId,
}

impl ReplySink {
    pub fn new(writer: BridgeWriter, origin: ChannelId) -> Self {
        Self { writer, origin }
    }

    /// Send a reply to the originating channel. Game color markup is
    /// stripped; the guild channel has its own formatting.
    pub fn send(&self, text: &str) {
        self.writer
            .write(strip_color_markup(text), SendTarget::Channel(self.origin));
    }
}

/// Everything a dispatched command needs from the bridge: who is invoking
/// it and where its output goes.
pub struct CommandContext {
    pub identity: SyntheticIdentity,
    pub reply: ReplySink,
}
