//! Top-level bridge wiring.
//!
//! `GuildBridge` owns the supervisor, relay and router, and exposes the
//! packet/event hooks the game server host calls into. Two independent
//! event sources drive it concurrently:
//!
//! 1. The host's packet pipeline calls the `on_*` hooks (game side).
//!    These only queue outbound work and never block on the platform.
//! 2. The supervisor's inbound channel feeds the pump task (guild side),
//!    which processes one external message at a time — a slow command
//!    dispatch never stalls game chat, which flows through path 1.
//!
//! Every hook returns `true` so the host pipeline continues processing
//! regardless of bridge state.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::config::BridgeConfig;
use crate::host::{
    ChatModeration, CommandDispatcher, GameBroadcast, PlatformClient, RankRegistry,
    SecondaryRelay,
};
use crate::permissions::{PermissionResolver, RankMapping};
use crate::protocol::{GameChat, PlatformEvent, PresenceEvent};
use crate::relay::MessageRelay;
use crate::router::{AllowList, CommandRouter};
use crate::supervisor::{SessionState, Supervisor};

/// Constructor-injected collaborator set. Nothing is discovered at
/// runtime; an absent secondary relay is simply `None`.
pub struct Collaborators {
    pub dispatcher: Arc<dyn CommandDispatcher>,
    pub ranks: Arc<dyn RankRegistry>,
    pub moderation: Arc<dyn ChatModeration>,
    pub game: Arc<dyn GameBroadcast>,
    pub secondary: Option<Arc<dyn SecondaryRelay>>,
    pub platform: Arc<dyn PlatformClient>,
}

/// The chat-and-command bridge between the game server and the guild
/// channel.
pub struct GuildBridge {
    enabled: bool,
    relay: Arc<MessageRelay>,
    supervisor: Arc<Supervisor>,
    /// Taken once by `start`.
    inbound_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<PlatformEvent>>>,
}

impl GuildBridge {
    pub fn new(config: BridgeConfig, collaborators: Collaborators) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let supervisor = Arc::new(Supervisor::new(
            collaborators.platform,
            config.token.clone(),
            config.channel,
            config.staff_channel,
            inbound_tx,
        ));
        let writer = supervisor.writer();

        let resolver = PermissionResolver::new(
            RankMapping::new(&config.rank_roles),
            collaborators.ranks,
            config.unmapped_rank_policy,
        );
        let router = CommandRouter::new(
            Arc::clone(&collaborators.dispatcher),
            resolver,
            AllowList::from_names(config.allowed_commands.iter().cloned()),
            writer.clone(),
        );

        let game_command_prefix = collaborators.dispatcher.command_prefix().to_string();
        let relay = Arc::new(MessageRelay::new(
            writer,
            router,
            collaborators.moderation,
            collaborators.game,
            collaborators.secondary,
            game_command_prefix,
            config.command_prefix.clone(),
            config.strip_colors,
            config.log_chat,
            config.channel,
            config.staff_channel,
        ));

        Self {
            enabled: config.enabled,
            relay,
            supervisor,
            inbound_rx: parking_lot::Mutex::new(Some(inbound_rx)),
        }
    }

    /// Start the supervised platform session and the inbound pump.
    /// A no-op when the bridge is disabled or already started.
    pub fn start(&self) {
        if !self.enabled {
            tracing::info!("Bridge disabled; not starting");
            return;
        }
        let Some(mut inbound_rx) = self.inbound_rx.lock().take() else {
            tracing::warn!("Bridge already started; ignoring");
            return;
        };

        tracing::info!("Starting guild bridge");
        let _ = self.supervisor.start();

        let relay = Arc::clone(&self.relay);
        let mut shutdown = self.supervisor.shutdown_signal();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    ev = inbound_rx.recv() => {
                        match ev {
                            Some(PlatformEvent::Message(msg)) => {
                                // One message at a time: an in-flight
                                // command dispatch completes before the
                                // next message (or shutdown) is observed.
                                relay.on_external_message(&msg).await;
                            }
                            None => break,
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("Inbound pump stopped");
        });
    }

    /// Stop retrying, release the platform session and end the pump.
    /// In-flight command dispatches are allowed to complete.
    pub fn shutdown(&self) {
        self.supervisor.shutdown();
    }

    /// Current platform session state.
    pub fn session_state(&self) -> SessionState {
        self.supervisor.state()
    }

    /// Watch platform session state transitions.
    pub fn session_changes(&self) -> watch::Receiver<SessionState> {
        self.supervisor.state_changes()
    }

    // ── Packet Hooks ──────────────────────────────────────────────────────

    /// Hook on a chat message broadcast on the game server.
    /// Always returns `true` so the packet moves on.
    pub fn on_chat_sent(&self, chat: &GameChat, sender_alias: &str) -> bool {
        if self.enabled {
            self.relay.on_game_chat(chat, sender_alias);
        }
        true
    }

    /// Hook on a player successfully connecting to the game server.
    /// Always returns `true` so the packet moves on.
    pub fn on_connect_success(&self, player_alias: &str) -> bool {
        if self.enabled {
            self.relay.announce(player_alias, PresenceEvent::Joined);
        }
        true
    }

    /// Hook on a player disconnecting from the game server.
    /// Always returns `true` so the packet moves on.
    pub fn on_client_disconnect_request(&self, player_alias: &str) -> bool {
        if self.enabled {
            self.relay.announce(player_alias, PresenceEvent::Left);
        }
        true
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
