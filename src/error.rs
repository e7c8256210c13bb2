//! Error types for the bridge.
//!
//! The taxonomy follows the failure domains of the bridge:
//!
//! - [`ConfigError`] — configuration file problems, surfaced at load time.
//! - [`PlatformError`] — transient platform-session faults (login, connect,
//!   send, stream). Caught at the supervisor boundary; never propagate past
//!   it.
//! - [`DispatchError`] — failures reported by the host's command dispatcher
//!   while running a routed command.
//! - [`BridgeError`] — configuration inconsistencies detected at runtime
//!   (e.g. a mapped rank missing from the live rank table). Degrade
//!   gracefully, never fatal.

use thiserror::Error;

/// Errors loading or parsing the bridge configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Transient faults from the external platform session.
///
/// Every variant is recoverable: the supervisor logs it, transitions to
/// `Failed` and reconnects.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform login failed: {0}")]
    Login(String),

    #[error("platform connect failed: {0}")]
    Connect(String),

    #[error("platform send failed: {0}")]
    Send(String),

    #[error("platform event stream closed")]
    StreamClosed,
}

/// A failure reported by the host's command dispatcher.
///
/// Logic faults inside a dispatched command are the dispatcher's
/// responsibility; the bridge only logs them and notifies the invoking
/// channel.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DispatchError(pub String);

impl DispatchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Runtime configuration inconsistencies.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A rank named in the role mapping does not exist in the host's rank
    /// table. Whether this rejects the command or falls back to guest is a
    /// policy decision, see `UnmappedRankPolicy`.
    #[error("rank '{0}' is not present in the rank table")]
    UnknownRank(String),
}
