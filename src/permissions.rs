//! Permission resolution for external users.
//!
//! Maps an external user's platform-side role set to an in-game rank, then
//! to that rank's permission set and priority via the host's rank table.
//! Roles are scanned in descending platform priority; the first role with
//! a configured mapping wins; no match resolves as guest.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::UnmappedRankPolicy;
use crate::error::BridgeError;
use crate::host::RankRegistry;
use crate::protocol::Role;

/// Rank used when no role has a configured mapping.
pub const GUEST_RANK: &str = "guest";

/// External role name → in-game rank name. Both sides are case-normalized
/// at construction so lookups never miss on capitalization.
#[derive(Debug, Clone, Default)]
pub struct RankMapping {
    map: HashMap<String, String>,
}

impl RankMapping {
    pub fn new(rank_roles: &HashMap<String, String>) -> Self {
        let map = rank_roles
            .iter()
            .map(|(role, rank)| (role.to_lowercase(), rank.to_lowercase()))
            .collect();
        Self { map }
    }

    /// The in-game rank configured for a role, if any.
    pub fn rank_for(&self, role_name: &str) -> Option<&str> {
        self.map.get(&role_name.to_lowercase()).map(String::as_str)
    }
}

/// The outcome of a successful resolution.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub rank: String,
    pub permissions: HashSet<String>,
    pub priority: i64,
}

/// Resolves external role sets to in-game permissions.
pub struct PermissionResolver {
    mapping: RankMapping,
    ranks: Arc<dyn RankRegistry>,
    policy: UnmappedRankPolicy,
}

impl PermissionResolver {
    pub fn new(
        mapping: RankMapping,
        ranks: Arc<dyn RankRegistry>,
        policy: UnmappedRankPolicy,
    ) -> Self {
        Self {
            mapping,
            ranks,
            policy,
        }
    }

    /// Resolve a role set to a rank's permissions and priority.
    ///
    /// The result is independent of the input ordering of `roles`: they
    /// are sorted by descending platform position before the scan. A
    /// mapped rank missing from the live rank table is a configuration
    /// inconsistency, handled per the configured policy — never a crash.
    pub fn resolve(&self, roles: &[Role]) -> Result<Resolved, BridgeError> {
        let mut sorted: Vec<&Role> = roles.iter().collect();
        sorted.sort_by(|a, b| b.position.cmp(&a.position));

        let rank = sorted
            .iter()
            .find_map(|role| self.mapping.rank_for(&role.name))
            .unwrap_or(GUEST_RANK)
            .to_string();

        if let Some(info) = self.ranks.rank(&rank) {
            return Ok(Resolved {
                rank,
                permissions: info.permissions,
                priority: info.priority,
            });
        }

        match self.policy {
            UnmappedRankPolicy::GuestFallback => {
                tracing::warn!(
                    rank = rank.as_str(),
                    "Mapped rank missing from rank table; falling back to guest"
                );
                match self.ranks.rank(GUEST_RANK) {
                    Some(info) => Ok(Resolved {
                        rank: GUEST_RANK.to_string(),
                        permissions: info.permissions,
                        priority: info.priority,
                    }),
                    None => {
                        tracing::warn!(
                            "Guest rank missing from rank table; resolving empty permission set"
                        );
                        Ok(Resolved {
                            rank: GUEST_RANK.to_string(),
                            permissions: HashSet::new(),
                            priority: 0,
                        })
                    }
                }
            }
            UnmappedRankPolicy::Reject => Err(BridgeError::UnknownRank(rank)),
        }
    }
}
