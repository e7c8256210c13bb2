//! # Guild Bridge
//!
//! A bidirectional chat-and-command bridge between a game server's chat
//! bus and an external group-chat platform ("the guild channel").
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        GUILD BRIDGE                              │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │   game server host                        guild platform         │
//! │  ┌──────────────┐   packet hooks   ┌──────────────────────┐      │
//! │  │ chat bus /   │ ───────────────► │ MessageRelay         │      │
//! │  │ connect /    │                  │  format, strip,      │      │
//! │  │ disconnect   │ ◄─────────────── │  announce            │      │
//! │  └──────────────┘    broadcasts    └──────────┬───────────┘      │
//! │                                               │ outbound queue   │
//! │  ┌──────────────┐                  ┌──────────▼───────────┐      │
//! │  │ command      │ ◄─── dispatch ── │ CommandRouter        │      │
//! │  │ dispatcher   │   (synthetic     │  allow-list, ranks,  │      │
//! │  └──────────────┘    identity)     │  reply sink          │      │
//! │                                    └──────────┬───────────┘      │
//! │                                    ┌──────────▼───────────┐      │
//! │                                    │ Supervisor           │      │
//! │                                    │  session lifecycle,  │      │
//! │                                    │  backoff, reconnect  │      │
//! │                                    └──────────────────────┘      │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the whole crate
//! - [`config`] - Bridge configuration (token, channels, rank mapping)
//! - [`protocol`] - Wire-facing data types shared across modules
//! - [`host`] - Traits the embedding game server implements
//! - [`supervisor`] - Platform session lifecycle and reconnect loop
//! - [`relay`] - Chat relay, text filters and presence announcements
//! - [`permissions`] - Role-to-rank permission resolution
//! - [`identity`] - Synthetic in-game identities for external users
//! - [`router`] - Command routing with allow-list gating
//! - [`bridge`] - Top-level wiring and the host-facing hooks

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod bridge;
pub mod config;
pub mod error;
pub mod host;
pub mod identity;
pub mod permissions;
pub mod protocol;
pub mod relay;
pub mod router;
pub mod supervisor;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use bridge::{Collaborators, GuildBridge};
pub use config::{BridgeConfig, UnmappedRankPolicy};
pub use error::{BridgeError, ConfigError, DispatchError, PlatformError};
pub use host::{
    ChatModeration, CommandDispatcher, GameBroadcast, PlatformClient, PlatformEvents,
    PlatformSession, PlatformSink, RankInfo, RankRegistry, SecondaryRelay,
};
pub use identity::{CommandContext, ReplySink, SyntheticIdentity};
pub use protocol::{
    ChannelId, ChatReceiveMode, ChatSendMode, ExternalMessage, ExternalUser, GameChat,
    OutboundMessage, PlatformEvent, PresenceEvent, Role, SendTarget,
};
pub use supervisor::SessionState;
