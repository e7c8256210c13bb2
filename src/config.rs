//! Bridge configuration.
//!
//! The config is a single JSON file owned by the host process. Everything
//! here degrades gracefully: a missing staff channel or an unmapped rank is
//! logged, never fatal.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::protocol::ChannelId;

/// Commands that may be invoked from the guild channel when no explicit
/// allow-list is configured.
pub const DEFAULT_ALLOWED_COMMANDS: &[&str] = &[
    "who",
    "help",
    "uptime",
    "motd",
    "show_spawn",
    "ban",
    "unban",
    "kick",
    "list_bans",
    "mute",
    "unmute",
    "set_motd",
    "whois",
    "broadcast",
    "user",
    "del_player",
    "list_players",
    "list_claims",
    "maintenance_mode",
    "shutdown",
    "save",
];

/// What to do when a role maps to a rank that is missing from the host's
/// live rank table. This is a configuration inconsistency, not a crash
/// condition either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedRankPolicy {
    /// Resolve as the guest rank (or an empty permission set if even the
    /// guest rank is absent) and log a warning.
    GuestFallback,
    /// Refuse the command with a textual reply.
    Reject,
}

/// Bridge configuration surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct BridgeConfig {
    /// Master switch. When false, every hook is a pass-through no-op.
    pub enabled: bool,
    /// Platform auth token, handed to the platform client on connect.
    pub token: String,
    /// Main guild channel ID.
    pub channel: ChannelId,
    /// Optional staff channel ID. Degrades to the main channel when it
    /// cannot be resolved.
    pub staff_channel: Option<ChannelId>,
    /// Strip `^…;` color markup from game chat before relaying it.
    pub strip_colors: bool,
    /// Also write relayed guild chat to the operational log.
    pub log_chat: bool,
    /// Command prefix recognized on guild-channel messages.
    pub command_prefix: String,
    /// External role name → in-game rank name. Lookups are case-normalized.
    pub rank_roles: HashMap<String, String>,
    /// Commands permitted to execute when invoked from the guild channel.
    pub allowed_commands: Vec<String>,
    /// Policy for ranks missing from the live rank table.
    pub unmapped_rank_policy: UnmappedRankPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token: String::new(),
            channel: 0,
            staff_channel: None,
            strip_colors: true,
            log_chat: false,
            command_prefix: "!".to_string(),
            rank_roles: HashMap::new(),
            allowed_commands: DEFAULT_ALLOWED_COMMANDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            unmapped_rank_policy: UnmappedRankPolicy::GuestFallback,
        }
    }
}

impl BridgeConfig {
    /// Load the configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        tracing::info!(
            enabled = config.enabled,
            channel = config.channel,
            staff_channel = ?config.staff_channel,
            rank_mappings = config.rank_roles.len(),
            allowed_commands = config.allowed_commands.len(),
            "Bridge config loaded"
        );
        Ok(config)
    }
}
