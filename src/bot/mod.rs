//! # Bot Module
//!
//! Discord adapter for the jukebox.
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`] and translates
//! gateway events into calls on the playback controller and the idle
//! monitor:
//!
//! - `ready`: registers slash commands (per guild in development)
//! - `interaction_create`: runs slash commands through [`handlers`]
//! - `voice_state_update`: notices external disconnects and feeds voice
//!   channel membership to the idle monitor

use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, UserId, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info};

pub mod announcer;
pub mod commands;
pub mod handlers;

use crate::{
    audio::{idle::IdlePresenceMonitor, player::PlaybackController},
    config::Config,
};
use announcer::ChannelAnnouncer;

pub struct JukeboxBot {
    config: Arc<Config>,
    pub controller: Arc<PlaybackController>,
    pub monitor: Arc<IdlePresenceMonitor>,
    pub announcer: Arc<ChannelAnnouncer>,
}

impl JukeboxBot {
    pub fn new(
        config: Arc<Config>,
        controller: Arc<PlaybackController>,
        monitor: Arc<IdlePresenceMonitor>,
        announcer: Arc<ChannelAnnouncer>,
    ) -> Self {
        Self {
            config,
            controller,
            monitor,
            announcer,
        }
    }

    async fn register_commands(&self, ctx: &Context) -> anyhow::Result<()> {
        match self.config.guild_id {
            Some(guild_id) => {
                commands::register_guild_commands(ctx, GuildId::new(guild_id)).await?;
                info!("✅ Commands registered in guild {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await?;
                info!("✅ Global commands registered");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} servers", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error registering commands: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error handling command: {:?}", e);
            }
        }
    }

    /// Tracks the bot's own voice presence.
    ///
    /// - **Bot disconnected** by someone else: drops the session and queue
    /// - **Anyone moved** in the guild: re-checks whether the bot is alone
    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let bot_id = ctx.cache.current_user().id;

        if new.user_id == bot_id && new.channel_id.is_none() {
            info!("🔌 Bot left voice in guild {}", guild_id);
            self.monitor.forget(guild_id);
            self.controller.handle_bot_disconnected(guild_id).await;
            return;
        }

        let Some(bot_channel) = self.controller.current_channel(guild_id).await else {
            self.monitor.forget(guild_id);
            return;
        };

        let members = channel_members(&ctx, guild_id, bot_channel);
        debug!(
            "{} member(s) in voice channel {} of guild {}",
            members.len(),
            bot_channel,
            guild_id
        );
        self.monitor
            .on_membership_changed(guild_id, bot_id, &members)
            .await;
    }
}

/// Users the gateway cache places in `channel_id`.
fn channel_members(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> Vec<UserId> {
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return Vec::new();
    };
    guild
        .voice_states
        .values()
        .filter(|state| state.channel_id == Some(channel_id))
        .map(|state| state.user_id)
        .collect()
}
