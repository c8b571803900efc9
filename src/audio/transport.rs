//! Songbird-backed voice transport.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::ControlError,
    input::{HttpRequest, Input, YoutubeDl},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::{
    audio::{
        queue::AudioSource,
        voice::{TrackEndNotifier, VoiceConnector, VoiceSession},
    },
    error::MusicError,
};

/// Joins voice channels through the shared [`Songbird`] manager.
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    volume: f32,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client, volume: f32) -> Self {
        Self {
            manager,
            http,
            volume,
        }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceSession>, MusicError> {
        let call = self.manager.join(guild_id, channel_id).await.map_err(|e| {
            error!("Error joining voice in guild {}: {:?}", guild_id, e);
            MusicError::ConnectFailed(e.to_string())
        })?;

        Ok(Arc::new(SongbirdSession {
            guild_id,
            manager: self.manager.clone(),
            call,
            http: self.http.clone(),
            volume: self.volume,
            track: parking_lot::Mutex::new(None),
        }))
    }
}

/// One guild's songbird call plus the handle of the track it is streaming.
pub struct SongbirdSession {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<Mutex<Call>>,
    http: reqwest::Client,
    volume: f32,
    track: parking_lot::Mutex<Option<TrackHandle>>,
}

impl SongbirdSession {
    fn input_for(&self, source: &AudioSource) -> Input {
        match source {
            AudioSource::Stream(url) => HttpRequest::new(self.http.clone(), url.clone()).into(),
            AudioSource::Page(url) => YoutubeDl::new(self.http.clone(), url.clone()).into(),
        }
    }

    fn handle(&self) -> Option<TrackHandle> {
        self.track.lock().clone()
    }
}

#[async_trait]
impl VoiceSession for SongbirdSession {
    async fn current_channel(&self) -> Option<ChannelId> {
        self.call
            .lock()
            .await
            .current_channel()
            .map(|channel| ChannelId::from(channel.0))
    }

    async fn move_to(&self, channel_id: ChannelId) -> Result<(), MusicError> {
        self.manager
            .join(self.guild_id, channel_id)
            .await
            .map(|_| ())
            .map_err(|e| MusicError::ConnectFailed(e.to_string()))
    }

    async fn disconnect(&self) {
        if let Err(e) = self.manager.remove(self.guild_id).await {
            warn!("Error leaving voice in guild {}: {:?}", self.guild_id, e);
        }
    }

    async fn play(&self, source: &AudioSource, on_end: TrackEndNotifier) -> Result<(), MusicError> {
        let input = self.input_for(source);
        let handle = self.call.lock().await.play_only_input(input);

        control_ok(self.guild_id, "set volume", handle.set_volume(self.volume));

        let fired = Arc::new(AtomicBool::new(false));
        for event in [TrackEvent::End, TrackEvent::Error] {
            let handler = TrackEndHandler {
                notifier: on_end.clone(),
                fired: fired.clone(),
            };
            handle
                .add_event(Event::Track(event), handler)
                .map_err(|e| MusicError::Playback(e.to_string()))?;
        }

        *self.track.lock() = Some(handle);
        Ok(())
    }

    async fn stop(&self) {
        if let Some(handle) = self.track.lock().take() {
            control_ok(self.guild_id, "stop track", handle.stop());
        }
    }

    async fn pause(&self) -> Result<(), MusicError> {
        let handle = self
            .handle()
            .ok_or_else(|| MusicError::Playback("no active track".into()))?;
        handle
            .pause()
            .map_err(|e| MusicError::Playback(e.to_string()))
    }

    async fn resume(&self) -> Result<(), MusicError> {
        let handle = self
            .handle()
            .ok_or_else(|| MusicError::Playback("no active track".into()))?;
        handle
            .play()
            .map_err(|e| MusicError::Playback(e.to_string()))
    }

    async fn is_playing(&self) -> bool {
        self.play_mode().await.is_some_and(|mode| matches!(mode, PlayMode::Play))
    }

    async fn is_paused(&self) -> bool {
        self.play_mode().await.is_some_and(|mode| matches!(mode, PlayMode::Pause))
    }
}

impl SongbirdSession {
    async fn play_mode(&self) -> Option<PlayMode> {
        let handle = self.handle()?;
        handle.get_info().await.ok().map(|state| state.playing)
    }
}

/// Forwards the end of a track to the controller, once.
struct TrackEndHandler {
    notifier: TrackEndNotifier,
    fired: Arc<AtomicBool>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if self.fired.swap(true, Ordering::SeqCst) {
            return None;
        }

        let error = match ctx {
            EventContext::Track(tracks) => tracks
                .iter()
                .find_map(|(state, _)| completion_error(&state.playing)),
            _ => None,
        };

        debug!(
            "Track {} ended in guild {}",
            self.notifier.token(),
            self.notifier.guild_id()
        );
        self.notifier.finish(error);
        None
    }
}

/// Track controls fail once the track has already ended; that is only
/// worth a debug line.
fn control_ok(guild_id: GuildId, action: &str, result: Result<(), ControlError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            debug!("Could not {} in guild {}: {:?}", action, guild_id, e);
            false
        }
    }
}

fn completion_error(mode: &PlayMode) -> Option<String> {
    match mode {
        PlayMode::Errored(e) => Some(format!("{e:?}")),
        _ => None,
    }
}
