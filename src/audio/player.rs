use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    fmt,
    sync::{Arc, Weak},
};
use tokio::sync::{
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    Mutex,
};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        queue::{PlaybackQueue, QueueSnapshot, Track},
        voice::{PlayerEvent, TrackEndNotifier, VoiceConnector, VoiceSession},
    },
    error::MusicError,
    sources::TrackResolver,
};

pub const QUEUE_DRAINED: &str = "There are no songs in the queue to play, disconnecting.";
pub const LEFT_WHILE_IDLE: &str = "Nobody is listening anymore, leaving the voice channel.";

/// Something the front end should show to the guild.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    NowPlaying(Track),
    Message(String),
}

/// Surfaces playback state changes to whatever is attached (chat channel,
/// logs, tests).
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn notify(&self, guild_id: GuildId, status: Status);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlayerStatus {
    #[default]
    Idle,
    Playing,
    Paused,
}

impl PlayerStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

/// Informational replies for commands. Unmet preconditions end up here
/// instead of in [`MusicError`].
#[derive(Debug, Clone, PartialEq)]
pub enum Feedback {
    Skipped(Track),
    WentBack(Track),
    Rewound(Track),
    Paused,
    Resumed,
    Stopped,
    Cleared(usize),
    NothingPlaying,
    AlreadyPaused,
    NotPaused,
    ResumeFirst,
    NoHistory,
    NothingToClear,
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped(track) => write!(f, "⏭️ Skipped **{}**.", track.title),
            Self::WentBack(track) => write!(f, "⏮️ Going back to **{}**.", track.title),
            Self::Rewound(track) => write!(f, "🔁 Restarting **{}**.", track.title),
            Self::Paused => write!(f, "⏸️ Paused."),
            Self::Resumed => write!(f, "▶️ Resumed."),
            Self::Stopped => write!(f, "⏹️ Stopped playing the current song, disconnecting."),
            Self::Cleared(count) => write!(f, "🗑️ Cleared the queue ({count} removed)."),
            Self::NothingPlaying => write!(f, "I am not playing any songs right now."),
            Self::AlreadyPaused => write!(f, "Playback is already paused."),
            Self::NotPaused => write!(f, "Playback is not paused."),
            Self::ResumeFirst => write!(f, "Playback is paused, resume it first."),
            Self::NoHistory => write!(f, "There is no previous song to go back to."),
            Self::NothingToClear => write!(f, "Nothing in the queue to clear."),
        }
    }
}

/// Result of a successful enqueue.
#[derive(Debug, Clone, PartialEq)]
pub struct Enqueued {
    pub track: Track,
    /// 1-based place in the upcoming queue, 0 when it started right away.
    pub position: usize,
    pub started: bool,
}

/// Playback state of one guild.
#[derive(Default)]
pub struct GuildMusicState {
    queue: PlaybackQueue,
    status: PlayerStatus,
    session: Option<Arc<dyn VoiceSession>>,
    // Id of the stream started last; completions carrying another id are stale.
    token: u64,
}

impl GuildMusicState {
    fn invalidate_stream(&mut self) {
        self.token += 1;
    }

    fn is_dormant(&self) -> bool {
        self.session.is_none() && self.queue.is_vacant()
    }
}

/// Per-guild playback state machine.
///
/// Every guild gets its own `tokio::sync::Mutex`, so commands for the same
/// guild run one at a time (including across the resolve and connect
/// awaits) while different guilds proceed independently. Track completion
/// never mutates state from the audio transport's context: the transport
/// posts a [`PlayerEvent`] and the controller's event loop picks it up.
pub struct PlaybackController {
    guilds: DashMap<GuildId, Arc<Mutex<GuildMusicState>>>,
    resolver: Arc<dyn TrackResolver>,
    connector: Arc<dyn VoiceConnector>,
    sink: Arc<dyn StatusSink>,
    events: UnboundedSender<PlayerEvent>,
}

impl PlaybackController {
    /// Builds the controller and spawns its event loop on the current runtime.
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        connector: Arc<dyn VoiceConnector>,
        sink: Arc<dyn StatusSink>,
    ) -> Arc<Self> {
        let (events, receiver) = mpsc::unbounded_channel();
        let controller = Arc::new(Self {
            guilds: DashMap::new(),
            resolver,
            connector,
            sink,
            events,
        });

        tokio::spawn(run_event_loop(Arc::downgrade(&controller), receiver));
        controller
    }

    /// Resolves `query`, joins the caller's voice channel and queues the track.
    /// Starts playback if nothing is playing yet.
    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        user_channel: Option<ChannelId>,
        query: &str,
    ) -> Result<Enqueued, MusicError> {
        let channel_id = user_channel.ok_or(MusicError::UserNotInVoice)?;

        let guild = self.guild(guild_id);
        let mut state = guild.lock().await;

        let result = self
            .enqueue_locked(guild_id, &mut state, channel_id, query)
            .await;
        self.evict_if_dormant(guild_id, &state);
        result
    }

    async fn enqueue_locked(
        &self,
        guild_id: GuildId,
        state: &mut GuildMusicState,
        channel_id: ChannelId,
        query: &str,
    ) -> Result<Enqueued, MusicError> {
        let track = self.resolver.resolve(query).await?;
        self.ensure_connected(guild_id, state, channel_id).await?;

        let position = state.queue.push(track.clone());
        let started = state.queue.current().is_none();
        if started {
            self.advance_locked(guild_id, state).await;
        }

        Ok(Enqueued {
            track,
            position: if started { 0 } else { position },
            started,
        })
    }

    async fn ensure_connected(
        &self,
        guild_id: GuildId,
        state: &mut GuildMusicState,
        channel_id: ChannelId,
    ) -> Result<(), MusicError> {
        if let Some(session) = &state.session {
            if session.current_channel().await != Some(channel_id) {
                session.move_to(channel_id).await?;
                info!("🔀 Moved to voice channel {} in guild {}", channel_id, guild_id);
            }
            return Ok(());
        }

        let session = self.connector.connect(guild_id, channel_id).await?;
        info!("🔊 Connected to voice channel {} in guild {}", channel_id, guild_id);
        state.session = Some(session);
        Ok(())
    }

    /// Starts the next queued track, or disconnects when the queue is empty.
    /// Does nothing while a track is still current.
    pub async fn advance(&self, guild_id: GuildId) {
        let guild = self.guild(guild_id);
        let mut state = guild.lock().await;

        if let Some(current) = state.queue.current() {
            debug!("Still playing {} in guild {}, not advancing", current.title, guild_id);
            return;
        }
        self.advance_locked(guild_id, &mut state).await;
        self.evict_if_dormant(guild_id, &state);
    }

    async fn advance_locked(&self, guild_id: GuildId, state: &mut GuildMusicState) {
        loop {
            if state.queue.is_empty() {
                if state.session.is_some() {
                    self.disconnect_locked(guild_id, state).await;
                    self.sink
                        .notify(guild_id, Status::Message(QUEUE_DRAINED.to_string()))
                        .await;
                }
                state.status = PlayerStatus::Idle;
                return;
            }

            let Some(session) = state.session.clone() else {
                warn!("No voice session in guild {}, cannot start the next track", guild_id);
                state.status = PlayerStatus::Idle;
                return;
            };

            let Some(track) = state.queue.start_next().cloned() else {
                return;
            };

            state.invalidate_stream();
            let on_end = TrackEndNotifier::new(guild_id, state.token, self.events.clone());

            match session.play(&track.source, on_end).await {
                Ok(()) => {
                    state.status = PlayerStatus::Playing;
                    info!("🎵 Now playing in guild {}: {}", guild_id, track.title);
                    self.sink.notify(guild_id, Status::NowPlaying(track)).await;
                    return;
                }
                Err(e) => {
                    warn!("⚠️ Could not start {} in guild {}: {}", track.title, guild_id, e);
                    state.queue.finish_current();
                    self.sink
                        .notify(
                            guild_id,
                            Status::Message(format!("Skipping **{}**: {}", track.title, e)),
                        )
                        .await;
                }
            }
        }
    }

    async fn disconnect_locked(&self, guild_id: GuildId, state: &mut GuildMusicState) {
        state.invalidate_stream();
        if let Some(session) = state.session.take() {
            session.stop().await;
            session.disconnect().await;
            info!("👋 Disconnected from voice in guild {}", guild_id);
        }
        state.status = PlayerStatus::Idle;
    }

    /// Handles a completion signal. Runs on the event loop only.
    async fn on_track_finished(&self, guild_id: GuildId, token: u64, error: Option<String>) {
        let Some(guild) = self.existing(guild_id) else {
            debug!("Track end for unknown guild {}", guild_id);
            return;
        };
        let mut state = guild.lock().await;

        if state.token != token || state.queue.current().is_none() {
            debug!("Ignoring stale track end {} in guild {}", token, guild_id);
            return;
        }

        if let Some(error) = error {
            warn!("⚠️ Track failed mid-play in guild {}: {}", guild_id, error);
        }

        if let Some(finished) = state.queue.finish_current() {
            debug!("✅ Finished {} in guild {}", finished.title, guild_id);
        }
        self.advance_locked(guild_id, &mut state).await;
        self.evict_if_dormant(guild_id, &state);
    }

    pub async fn skip(&self, guild_id: GuildId) -> Feedback {
        let Some(guild) = self.existing(guild_id) else {
            return Feedback::NothingPlaying;
        };
        let mut state = guild.lock().await;

        if !state.status.is_active() {
            return Feedback::NothingPlaying;
        }
        let Some(skipped) = state.queue.current().cloned() else {
            return Feedback::NothingPlaying;
        };

        state.invalidate_stream();
        if let Some(session) = &state.session {
            session.stop().await;
        }
        state.queue.finish_current();
        info!("⏭️ Skipped {} in guild {}", skipped.title, guild_id);

        self.advance_locked(guild_id, &mut state).await;
        Feedback::Skipped(skipped)
    }

    /// Plays the most recent history entry next, keeping the interrupted
    /// track right behind it.
    pub async fn back(&self, guild_id: GuildId) -> Feedback {
        let Some(guild) = self.existing(guild_id) else {
            return Feedback::NothingPlaying;
        };
        let mut state = guild.lock().await;

        match state.status {
            PlayerStatus::Playing => {}
            PlayerStatus::Paused => return Feedback::ResumeFirst,
            _ => return Feedback::NothingPlaying,
        }
        let Some(previous) = state.queue.history().last().cloned() else {
            return Feedback::NoHistory;
        };

        state.invalidate_stream();
        if let Some(session) = &state.session {
            session.stop().await;
        }
        // Current first, then previous, so previous ends up at the head.
        state.queue.requeue_current();
        state.queue.requeue_previous();
        info!("⏮️ Going back to {} in guild {}", previous.title, guild_id);

        self.advance_locked(guild_id, &mut state).await;
        Feedback::WentBack(previous)
    }

    pub async fn pause(&self, guild_id: GuildId) -> Feedback {
        let Some(guild) = self.existing(guild_id) else {
            return Feedback::NothingPlaying;
        };
        let mut state = guild.lock().await;

        match state.status {
            PlayerStatus::Playing => {}
            PlayerStatus::Paused => return Feedback::AlreadyPaused,
            _ => return Feedback::NothingPlaying,
        }
        let Some(session) = state.session.clone() else {
            return Feedback::NothingPlaying;
        };

        match session.pause().await {
            Ok(()) => {
                state.status = PlayerStatus::Paused;
                info!("⏸️ Paused in guild {}", guild_id);
                Feedback::Paused
            }
            Err(e) => {
                warn!("Pause failed in guild {}: {}", guild_id, e);
                Feedback::NothingPlaying
            }
        }
    }

    pub async fn resume(&self, guild_id: GuildId) -> Feedback {
        let Some(guild) = self.existing(guild_id) else {
            return Feedback::NothingPlaying;
        };
        let mut state = guild.lock().await;

        match state.status {
            PlayerStatus::Paused => {}
            PlayerStatus::Playing => return Feedback::NotPaused,
            _ => return Feedback::NothingPlaying,
        }
        let Some(session) = state.session.clone() else {
            return Feedback::NothingPlaying;
        };

        match session.resume().await {
            Ok(()) => {
                state.status = PlayerStatus::Playing;
                info!("▶️ Resumed in guild {}", guild_id);
                Feedback::Resumed
            }
            Err(e) => {
                warn!("Resume failed in guild {}: {}", guild_id, e);
                Feedback::NothingPlaying
            }
        }
    }

    /// Restarts the current track from the beginning.
    pub async fn rewind(&self, guild_id: GuildId) -> Feedback {
        let Some(guild) = self.existing(guild_id) else {
            return Feedback::NothingPlaying;
        };
        let mut state = guild.lock().await;

        match state.status {
            PlayerStatus::Playing => {}
            PlayerStatus::Paused => return Feedback::ResumeFirst,
            _ => return Feedback::NothingPlaying,
        }
        let Some(current) = state.queue.current().cloned() else {
            return Feedback::NothingPlaying;
        };

        state.invalidate_stream();
        if let Some(session) = &state.session {
            session.stop().await;
        }
        state.queue.requeue_current();
        info!("🔁 Rewinding {} in guild {}", current.title, guild_id);

        self.advance_locked(guild_id, &mut state).await;
        Feedback::Rewound(current)
    }

    /// Stops playback, leaves the channel and clears the queue. History is
    /// only wiped when nothing was playing.
    pub async fn stop(&self, guild_id: GuildId) -> Feedback {
        let Some(guild) = self.existing(guild_id) else {
            return Feedback::NothingPlaying;
        };
        let mut state = guild.lock().await;

        let was_playing = state.queue.current().is_some();
        self.disconnect_locked(guild_id, &mut state).await;
        state.queue.finish_current();
        state.queue.clear();
        if !was_playing {
            state.queue.clear_history();
        }
        info!("⏹️ Stopped in guild {}", guild_id);

        self.evict_if_dormant(guild_id, &state);
        if was_playing {
            Feedback::Stopped
        } else {
            Feedback::NothingPlaying
        }
    }

    /// Empties the upcoming queue; the current track keeps playing.
    pub async fn clear(&self, guild_id: GuildId) -> Feedback {
        let Some(guild) = self.existing(guild_id) else {
            return Feedback::NothingToClear;
        };
        let mut state = guild.lock().await;

        let removed = state.queue.len();
        if removed == 0 {
            return Feedback::NothingToClear;
        }
        state.queue.clear();
        Feedback::Cleared(removed)
    }

    /// Leaves the channel after the bot sat alone in it. Returns whether a
    /// connection was actually torn down.
    pub async fn idle_disconnect(&self, guild_id: GuildId) -> bool {
        let Some(guild) = self.existing(guild_id) else {
            return false;
        };
        let mut state = guild.lock().await;

        if state.session.is_none() {
            return false;
        }
        self.disconnect_locked(guild_id, &mut state).await;
        state.queue.finish_current();
        state.queue.clear();
        info!("🚪 Left idle voice channel in guild {}", guild_id);
        self.sink
            .notify(guild_id, Status::Message(LEFT_WHILE_IDLE.to_string()))
            .await;

        self.evict_if_dormant(guild_id, &state);
        true
    }

    /// The bot was removed from voice by someone else. Drops the session
    /// without disconnecting again, unless the session already reports a
    /// live channel (a late event from an earlier connection).
    pub async fn handle_bot_disconnected(&self, guild_id: GuildId) {
        let Some(guild) = self.existing(guild_id) else {
            return;
        };
        let mut state = guild.lock().await;

        let Some(session) = state.session.clone() else {
            return;
        };
        if session.current_channel().await.is_some() {
            debug!("Voice session in guild {} is still live, ignoring disconnect", guild_id);
            return;
        }

        state.invalidate_stream();
        state.session = None;
        state.status = PlayerStatus::Idle;
        state.queue.finish_current();
        state.queue.clear();
        warn!("🔌 Removed from voice in guild {}, queue dropped", guild_id);

        self.evict_if_dormant(guild_id, &state);
    }

    pub async fn is_connected(&self, guild_id: GuildId) -> bool {
        match self.existing(guild_id) {
            Some(guild) => guild.lock().await.session.is_some(),
            None => false,
        }
    }

    pub async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let guild = self.existing(guild_id)?;
        let session = guild.lock().await.session.clone()?;
        session.current_channel().await
    }

    pub async fn status(&self, guild_id: GuildId) -> PlayerStatus {
        match self.existing(guild_id) {
            Some(guild) => guild.lock().await.status,
            None => PlayerStatus::Idle,
        }
    }

    /// What the audio transport itself reports, which can lag behind
    /// [`status`](Self::status) while a stream is being opened.
    pub async fn transport_status(&self, guild_id: GuildId) -> PlayerStatus {
        let Some(guild) = self.existing(guild_id) else {
            return PlayerStatus::Idle;
        };
        let Some(session) = guild.lock().await.session.clone() else {
            return PlayerStatus::Idle;
        };
        if session.is_paused().await {
            PlayerStatus::Paused
        } else if session.is_playing().await {
            PlayerStatus::Playing
        } else {
            PlayerStatus::Idle
        }
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> QueueSnapshot {
        match self.existing(guild_id) {
            Some(guild) => guild.lock().await.queue.snapshot(),
            None => QueueSnapshot::default(),
        }
    }

    pub fn has_guild(&self, guild_id: GuildId) -> bool {
        self.guilds.contains_key(&guild_id)
    }

    fn guild(&self, guild_id: GuildId) -> Arc<Mutex<GuildMusicState>> {
        self.guilds.entry(guild_id).or_default().clone()
    }

    fn existing(&self, guild_id: GuildId) -> Option<Arc<Mutex<GuildMusicState>>> {
        self.guilds.get(&guild_id).map(|g| g.clone())
    }

    /// Drops the registry entry of a dormant guild. Must be called while the
    /// caller still holds its own handle and lock: a count of two means the
    /// map and the caller are the only owners, so nobody is waiting on it.
    fn evict_if_dormant(&self, guild_id: GuildId, state: &GuildMusicState) {
        if !state.is_dormant() {
            return;
        }
        if self
            .guilds
            .remove_if(&guild_id, |_, entry| Arc::strong_count(entry) <= 2)
            .is_some()
        {
            debug!("Evicted music state for guild {}", guild_id);
        }
    }
}

async fn run_event_loop(
    controller: Weak<PlaybackController>,
    mut events: UnboundedReceiver<PlayerEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(controller) = controller.upgrade() else {
            break;
        };
        match event {
            PlayerEvent::TrackFinished {
                guild_id,
                token,
                error,
            } => {
                // Each guild waits on its own lock; one busy guild must not
                // hold up completions for the others.
                tokio::spawn(async move {
                    controller.on_track_finished(guild_id, token, error).await;
                });
            }
        }
    }
    debug!("Player event loop stopped");
}
