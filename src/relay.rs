//! Message relay between the game server and the guild channel.
//!
//! Game → guild: universe chat that is not a command invocation and whose
//! sender is not muted is relayed as `**alias** text`, with optional
//! `^…;` color-markup stripping.
//!
//! Guild → game: messages from the bound channels are relayed into the
//! game with a `[DC]` tag after emoji shortcodes are flattened to plain
//! `:name:` text; lines starting with the command prefix are handed to the
//! command router instead. Messages authored by bots — including the
//! bridge's own — are never relayed back (no echo loop).

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::host::{ChatModeration, GameBroadcast, SecondaryRelay};
use crate::protocol::{
    ChannelId, ChatReceiveMode, ChatSendMode, ExternalMessage, GameChat, PresenceEvent,
    SendTarget,
};
use crate::router::{CommandRouter, RouteOutcome};
use crate::supervisor::BridgeWriter;

/// Settle delay before posting a join/leave announcement, so a freshly
/// reconnected platform session has a resolved channel binding.
pub const ANNOUNCE_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Tag prefixed to guild chat broadcast into the game.
const GAME_TAG: &str = "[^orange;DC^reset;]";

/// Tag prefixed to guild chat mirrored to the secondary bridge.
const MIRROR_TAG: &str = "[DC]";

/// Game color markup: a caret, arbitrary characters, a semicolon.
static COLOR_MARKUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\^(.*?);").unwrap());

/// Platform emoji shortcode, e.g. `<:smile:1234>` or animated `<a:wave:5>`.
static EMOJI_SHORTCODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<a?:([A-Za-z0-9_]+):[0-9]+>").unwrap());

/// Remove `^…;` color markup. Idempotent: stripping an already-stripped
/// string yields the same string.
pub fn strip_color_markup(text: &str) -> String {
    COLOR_MARKUP.replace_all(text, "").into_owned()
}

/// Flatten platform emoji shortcodes to plain `:name:` text.
pub fn plain_emoji(text: &str) -> String {
    EMOJI_SHORTCODE.replace_all(text, ":$1:").into_owned()
}

/// Relays chat in both directions and posts presence announcements.
pub struct MessageRelay {
    writer: BridgeWriter,
    router: CommandRouter,
    moderation: Arc<dyn ChatModeration>,
    game: Arc<dyn GameBroadcast>,
    secondary: Option<Arc<dyn SecondaryRelay>>,

    /// The dispatcher's in-game command prefix; game chat starting with it
    /// is a command invocation and is not relayed.
    game_command_prefix: String,
    /// Prefix recognized on guild-channel messages.
    external_command_prefix: String,
    strip_colors: bool,
    log_chat: bool,
    main_channel: ChannelId,
    staff_channel: Option<ChannelId>,
}

impl MessageRelay {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        writer: BridgeWriter,
        router: CommandRouter,
        moderation: Arc<dyn ChatModeration>,
        game: Arc<dyn GameBroadcast>,
        secondary: Option<Arc<dyn SecondaryRelay>>,
        game_command_prefix: String,
        external_command_prefix: String,
        strip_colors: bool,
        log_chat: bool,
        main_channel: ChannelId,
        staff_channel: Option<ChannelId>,
    ) -> Self {
        Self {
            writer,
            router,
            moderation,
            game,
            secondary,
            game_command_prefix,
            external_command_prefix,
            strip_colors,
            log_chat,
            main_channel,
            staff_channel,
        }
    }

    // ── Game → Guild ──────────────────────────────────────────────────────

    /// Relay a game-side chat message to the main guild channel.
    ///
    /// Command invocations, non-universe chat and muted senders are
    /// ignored.
    pub fn on_game_chat(&self, chat: &GameChat, sender_alias: &str) {
        if chat.message.starts_with(&self.game_command_prefix) {
            return;
        }
        if chat.send_mode != ChatSendMode::Universe {
            return;
        }
        if self.moderation.is_muted(sender_alias) {
            tracing::debug!(alias = sender_alias, "Sender muted; not relaying");
            return;
        }

        let msg = if self.strip_colors {
            strip_color_markup(&chat.message)
        } else {
            chat.message.clone()
        };
        self.writer
            .write(format!("**{sender_alias}** {msg}"), SendTarget::Main);
    }

    // ── Guild → Game ──────────────────────────────────────────────────────

    /// Handle a message received on the external platform.
    ///
    /// Returns the routing outcome for commands, `None` for plain chat or
    /// ignored messages.
    pub async fn on_external_message(&self, msg: &ExternalMessage) -> Option<RouteOutcome> {
        // Anti-echo: never relay bot-authored messages, our own included.
        if msg.author.is_bot {
            return None;
        }
        let bound = msg.channel == self.main_channel
            || self.staff_channel == Some(msg.channel);
        if !bound {
            return None;
        }

        if let Some(rest) = msg.content.strip_prefix(&self.external_command_prefix) {
            let outcome = self.router.route(rest, &msg.author, msg.channel).await;
            return Some(outcome);
        }

        // Plain chat is relayed into the game from the main channel only.
        if msg.channel != self.main_channel {
            return None;
        }

        let nick = &msg.author.display_name;
        let text = plain_emoji(&msg.content);
        self.game
            .broadcast(
                &format!("{GAME_TAG} <{nick}> {text}"),
                ChatReceiveMode::Broadcast,
            )
            .await;
        if self.log_chat {
            tracing::info!("<{nick}> {text}");
        }
        if let Some(secondary) = &self.secondary {
            secondary.write(&format!("{MIRROR_TAG} <{nick}> {text}")).await;
        }
        None
    }

    // ── Announcements ─────────────────────────────────────────────────────

    /// Post a join/leave announcement to the main channel after the settle
    /// delay.
    pub fn announce(&self, alias: &str, event: PresenceEvent) {
        let writer = self.writer.clone();
        let alias = alias.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(ANNOUNCE_SETTLE_DELAY).await;
            writer.write(
                format!("**{alias}** has {event} the server."),
                SendTarget::Main,
            );
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
