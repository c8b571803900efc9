use async_trait::async_trait;
use dashmap::DashMap;
use serenity::{
    builder::CreateMessage,
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    audio::player::{Status, StatusSink},
    ui::embeds,
};

/// Posts playback status to the text channel a guild last used a music
/// command in.
pub struct ChannelAnnouncer {
    http: Arc<Http>,
    channels: DashMap<GuildId, ChannelId>,
}

impl ChannelAnnouncer {
    pub fn new(http: Arc<Http>) -> Self {
        Self {
            http,
            channels: DashMap::new(),
        }
    }

    pub fn remember(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.channels.insert(guild_id, channel_id);
    }

    pub fn channel_for(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.channels.get(&guild_id).map(|c| *c)
    }
}

#[async_trait]
impl StatusSink for ChannelAnnouncer {
    async fn notify(&self, guild_id: GuildId, status: Status) {
        let Some(channel_id) = self.channel_for(guild_id) else {
            debug!("No text channel known for guild {}, dropping status", guild_id);
            return;
        };

        let message = match &status {
            Status::NowPlaying(track) => CreateMessage::new().embed(embeds::now_playing_embed(track)),
            Status::Message(text) => CreateMessage::new().content(text),
        };

        if let Err(e) = channel_id.send_message(&self.http, message).await {
            warn!("Could not post status in channel {}: {:?}", channel_id, e);
        }
    }
}
