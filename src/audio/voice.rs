use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::{audio::queue::AudioSource, error::MusicError};

/// Messages posted onto the controller's event loop from outside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    TrackFinished {
        guild_id: GuildId,
        token: u64,
        error: Option<String>,
    },
}

/// Completion handle handed to [`VoiceSession::play`].
///
/// The audio transport may call [`TrackEndNotifier::finish`] from any thread;
/// it only sends a [`PlayerEvent`] and never touches guild state directly.
#[derive(Debug, Clone)]
pub struct TrackEndNotifier {
    guild_id: GuildId,
    token: u64,
    events: UnboundedSender<PlayerEvent>,
}

impl TrackEndNotifier {
    pub(crate) fn new(guild_id: GuildId, token: u64, events: UnboundedSender<PlayerEvent>) -> Self {
        Self {
            guild_id,
            token,
            events,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn finish(&self, error: Option<String>) {
        let event = PlayerEvent::TrackFinished {
            guild_id: self.guild_id,
            token: self.token,
            error,
        };
        if self.events.send(event).is_err() {
            warn!(
                "Player event loop is gone, dropping track end for guild {}",
                self.guild_id
            );
        }
    }
}

/// Opens voice connections.
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceSession>, MusicError>;
}

/// A live voice connection for one guild and the audio sink on top of it.
#[async_trait]
pub trait VoiceSession: Send + Sync {
    async fn current_channel(&self) -> Option<ChannelId>;

    async fn move_to(&self, channel_id: ChannelId) -> Result<(), MusicError>;

    async fn disconnect(&self);

    /// Starts streaming `source`, replacing whatever was playing. `on_end`
    /// fires once when the stream ends or fails.
    async fn play(&self, source: &AudioSource, on_end: TrackEndNotifier) -> Result<(), MusicError>;

    async fn stop(&self);

    async fn pause(&self) -> Result<(), MusicError>;

    async fn resume(&self) -> Result<(), MusicError>;

    async fn is_playing(&self) -> bool;

    async fn is_paused(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    #[test]
    fn notifier_posts_from_a_foreign_thread() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = TrackEndNotifier::new(GuildId::new(7), 3, tx);

        std::thread::spawn(move || notifier.finish(Some("decoder died".into())))
            .join()
            .unwrap();

        assert_eq!(
            rx.try_recv().ok(),
            Some(PlayerEvent::TrackFinished {
                guild_id: GuildId::new(7),
                token: 3,
                error: Some("decoder died".into()),
            })
        );
    }

    #[test]
    fn notifier_tolerates_a_closed_loop() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        TrackEndNotifier::new(GuildId::new(1), 1, tx).finish(None);
    }
}
