//! Command routing for guild-channel invocations.
//!
//! A command line typed on the guild channel is validated against the
//! allow-list *before* the dispatcher's registry, so external users cannot
//! probe which commands exist beyond the exposed subset. Every attempt
//! gets exactly one textual response: a rejection reply, or whatever the
//! dispatched command writes back through its reply sink.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::BridgeError;
use crate::host::CommandDispatcher;
use crate::identity::{CommandContext, ReplySink, SyntheticIdentity};
use crate::permissions::PermissionResolver;
use crate::protocol::{ChannelId, ExternalUser};
use crate::supervisor::BridgeWriter;

/// Reply for commands outside the allow-list. Also covers commands the
/// resolver refused under the reject policy.
pub const NOT_HANDLED_REPLY: &str = "Command not handled from the guild channel.";

/// Reply for allow-listed commands missing from the live registry.
pub const NOT_FOUND_REPLY: &str = "Command not found.";

/// Reply when the dispatcher reports a failure.
const FAILED_REPLY: &str = "Command failed; see the server log.";

// ── Allow-list ────────────────────────────────────────────────────────────────

/// The immutable set of commands permitted to execute when invoked from
/// the guild channel. Membership is necessary but not sufficient — the
/// command must also exist in the dispatcher's registry.
#[derive(Debug, Clone)]
pub struct AllowList {
    names: HashSet<String>,
}

impl AllowList {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

/// How a routed command line was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Dispatched to the command dispatcher (which may itself have
    /// reported a failure — logged and replied, but still dispatched).
    Dispatched,
    /// Not in the allow-list; no dispatch attempted.
    NotAllowed,
    /// Allow-listed but absent from the dispatcher's registry.
    NotFound,
    /// Refused by the permission resolver under the reject policy.
    Rejected,
    /// Empty command line; nothing to do.
    Ignored,
}

/// Parses, validates and dispatches guild-channel command lines.
pub struct CommandRouter {
    dispatcher: Arc<dyn CommandDispatcher>,
    resolver: PermissionResolver,
    allow: AllowList,
    writer: BridgeWriter,
}

impl CommandRouter {
    pub fn new(
        dispatcher: Arc<dyn CommandDispatcher>,
        resolver: PermissionResolver,
        allow: AllowList,
        writer: BridgeWriter,
    ) -> Self {
        Self {
            dispatcher,
            resolver,
            allow,
            writer,
        }
    }

    /// Route one command line (already stripped of its prefix) on behalf
    /// of `user`. Replies go to `origin`, the channel the line came from.
    pub async fn route(
        &self,
        line: &str,
        user: &ExternalUser,
        origin: ChannelId,
    ) -> RouteOutcome {
        let mut tokens = line.split_whitespace();
        let Some(command) = tokens.next() else {
            return RouteOutcome::Ignored;
        };
        let args: Vec<String> = tokens.map(String::from).collect();
        let reply = ReplySink::new(self.writer.clone(), origin);

        if !self.allow.contains(command) {
            tracing::debug!(
                command,
                user = user.display_name.as_str(),
                "Command not in allow-list"
            );
            reply.send(NOT_HANDLED_REPLY);
            return RouteOutcome::NotAllowed;
        }

        if !self.dispatcher.has_command(command) {
            reply.send(NOT_FOUND_REPLY);
            return RouteOutcome::NotFound;
        }

        let resolved = match self.resolver.resolve(&user.roles) {
            Ok(resolved) => resolved,
            Err(BridgeError::UnknownRank(rank)) => {
                tracing::warn!(
                    rank = rank.as_str(),
                    user = user.display_name.as_str(),
                    "Refusing command for unmapped rank"
                );
                reply.send(NOT_HANDLED_REPLY);
                return RouteOutcome::Rejected;
            }
        };

        tracing::info!(
            command,
            user = user.display_name.as_str(),
            rank = resolved.rank.as_str(),
            "Dispatching guild-channel command"
        );

        let ctx = CommandContext {
            identity: SyntheticIdentity::bind(user, &resolved),
            reply: reply.clone(),
        };
        if let Err(e) = self.dispatcher.run_command(command, ctx, &args).await {
            tracing::error!(
                command,
                user = user.display_name.as_str(),
                error = %e,
                "Dispatched command failed"
            );
            reply.send(FAILED_REPLY);
        }
        RouteOutcome::Dispatched
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnmappedRankPolicy;
    use crate::error::DispatchError;
    use crate::host::{RankInfo, RankRegistry};
    use crate::permissions::RankMapping;
    use crate::protocol::{OutboundMessage, Role, SendTarget};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    /// Records each dispatch's command, alias, permissions and args.
    #[derive(Debug, Clone)]
    struct DispatchRecord {
        command: String,
        alias: String,
        priority: i64,
        can_kick: bool,
        args: Vec<String>,
    }

    struct RecordingDispatcher {
        registry: HashSet<String>,
        dispatches: mpsc::UnboundedSender<DispatchRecord>,
        fail: bool,
    }

    #[async_trait]
    impl CommandDispatcher for RecordingDispatcher {
        fn command_prefix(&self) -> &str {
            "/"
        }

        fn has_command(&self, name: &str) -> bool {
            self.registry.contains(name)
        }

        async fn run_command(
            &self,
            name: &str,
            ctx: CommandContext,
            args: &[String],
        ) -> Result<(), DispatchError> {
            let _ = self.dispatches.send(DispatchRecord {
                command: name.to_string(),
                alias: ctx.identity.alias.clone(),
                priority: ctx.identity.priority,
                can_kick: ctx.identity.perm_check("kick"),
                args: args.to_vec(),
            });
            if self.fail {
                return Err(DispatchError::new("boom"));
            }
            ctx.reply.send(&format!("Ran {name}."));
            Ok(())
        }
    }

    struct TableRanks(HashMap<String, RankInfo>);
    impl RankRegistry for TableRanks {
        fn rank(&self, name: &str) -> Option<RankInfo> {
            self.0.get(name).cloned()
        }
    }

    struct Harness {
        router: CommandRouter,
        outbound: mpsc::UnboundedReceiver<OutboundMessage>,
        dispatches: mpsc::UnboundedReceiver<DispatchRecord>,
    }

    fn make_router(policy: UnmappedRankPolicy, fail_dispatch: bool) -> Harness {
        let (out_tx, outbound) = mpsc::unbounded_channel();
        let (dis_tx, dispatches) = mpsc::unbounded_channel();

        let mut table = HashMap::new();
        table.insert(
            "mod".to_string(),
            RankInfo {
                permissions: ["kick".to_string()].into_iter().collect(),
                priority: 50,
            },
        );
        table.insert(
            "guest".to_string(),
            RankInfo {
                permissions: HashSet::new(),
                priority: 0,
            },
        );

        let mut roles = HashMap::new();
        roles.insert("Moderator".to_string(), "mod".to_string());
        roles.insert("Ghost".to_string(), "phantom".to_string());

        let resolver = PermissionResolver::new(
            RankMapping::new(&roles),
            Arc::new(TableRanks(table)),
            policy,
        );
        let router = CommandRouter::new(
            Arc::new(RecordingDispatcher {
                registry: ["kick", "who"].iter().map(|s| s.to_string()).collect(),
                dispatches: dis_tx,
                fail: fail_dispatch,
            }),
            resolver,
            AllowList::from_names(["kick", "who", "maintenance_mode"]),
            BridgeWriter::new(out_tx),
        );
        Harness {
            router,
            outbound,
            dispatches,
        }
    }

    fn moderator(name: &str) -> ExternalUser {
        ExternalUser {
            display_name: name.to_string(),
            is_bot: false,
            roles: vec![Role {
                name: "Moderator".to_string(),
                position: 5,
            }],
        }
    }

    #[tokio::test]
    async fn test_disallowed_command_rejected_without_dispatch() {
        let mut h = make_router(UnmappedRankPolicy::GuestFallback, false);
        // "shutdown" exists in neither the allow-list nor this registry,
        // but the allow-list check must fire first and alone.
        let outcome = h.router.route("shutdown now", &moderator("M"), 42).await;
        assert_eq!(outcome, RouteOutcome::NotAllowed);

        let out = h.outbound.try_recv().unwrap();
        assert_eq!(out.text, NOT_HANDLED_REPLY);
        assert_eq!(out.target, SendTarget::Channel(42));
        assert!(h.outbound.try_recv().is_err(), "exactly one reply");
        assert!(h.dispatches.try_recv().is_err(), "no dispatch");
    }

    #[tokio::test]
    async fn test_allowed_but_unregistered_command_not_found() {
        let mut h = make_router(UnmappedRankPolicy::GuestFallback, false);
        let outcome = h
            .router
            .route("maintenance_mode", &moderator("M"), 42)
            .await;
        assert_eq!(outcome, RouteOutcome::NotFound);

        let out = h.outbound.try_recv().unwrap();
        assert_eq!(out.text, NOT_FOUND_REPLY);
        assert!(h.dispatches.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_moderator_kick_dispatches_with_identity() {
        let mut h = make_router(UnmappedRankPolicy::GuestFallback, false);
        let outcome = h
            .router
            .route("kick Bob", &moderator("Staff Sally"), 42)
            .await;
        assert_eq!(outcome, RouteOutcome::Dispatched);

        let record = h.dispatches.try_recv().unwrap();
        assert_eq!(record.command, "kick");
        assert_eq!(record.alias, "Staff Sally");
        assert_eq!(record.priority, 50);
        assert!(record.can_kick);
        assert_eq!(record.args, vec!["Bob".to_string()]);

        // The command's own output went back to the originating channel.
        let out = h.outbound.try_recv().unwrap();
        assert_eq!(out.text, "Ran kick.");
        assert_eq!(out.target, SendTarget::Channel(42));
    }

    #[tokio::test]
    async fn test_empty_line_ignored() {
        let mut h = make_router(UnmappedRankPolicy::GuestFallback, false);
        let outcome = h.router.route("   ", &moderator("M"), 42).await;
        assert_eq!(outcome, RouteOutcome::Ignored);
        assert!(h.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reject_policy_refuses_unmapped_rank() {
        let mut h = make_router(UnmappedRankPolicy::Reject, false);
        let user = ExternalUser {
            display_name: "Spooky".to_string(),
            is_bot: false,
            roles: vec![Role {
                name: "Ghost".to_string(),
                position: 9,
            }],
        };
        let outcome = h.router.route("kick Bob", &user, 42).await;
        assert_eq!(outcome, RouteOutcome::Rejected);
        let out = h.outbound.try_recv().unwrap();
        assert_eq!(out.text, NOT_HANDLED_REPLY);
        assert!(h.dispatches.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dispatch_failure_logged_and_replied() {
        let mut h = make_router(UnmappedRankPolicy::GuestFallback, true);
        let outcome = h.router.route("who", &moderator("M"), 42).await;
        assert_eq!(outcome, RouteOutcome::Dispatched);
        let out = h.outbound.try_recv().unwrap();
        assert!(out.text.contains("Command failed"));
    }

    #[tokio::test]
    async fn test_back_to_back_dispatches_do_not_cross_contaminate() {
        let mut h = make_router(UnmappedRankPolicy::GuestFallback, false);
        let mod_user = moderator("Staff Sally");
        let guest = ExternalUser {
            display_name: "Randomer".to_string(),
            is_bot: false,
            roles: vec![],
        };

        h.router.route("kick Bob", &mod_user, 42).await;
        h.router.route("who", &guest, 43).await;

        let first = h.dispatches.try_recv().unwrap();
        let second = h.dispatches.try_recv().unwrap();
        assert_eq!(first.alias, "Staff Sally");
        assert!(first.can_kick);
        assert_eq!(second.alias, "Randomer");
        assert!(!second.can_kick, "guest dispatch saw only guest permissions");
        assert_eq!(second.priority, 0);
    }
}
