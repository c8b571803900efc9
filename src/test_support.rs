//! Recording fakes for the voice transport and status sink.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{collections::HashMap, sync::Arc, time::Duration};

use crate::{
    audio::{
        player::{Status, StatusSink},
        queue::{AudioSource, Track},
        voice::{TrackEndNotifier, VoiceConnector, VoiceSession},
    },
    error::MusicError,
    sources::MockTrackResolver,
};

/// A track whose title and stream locator are both `name`.
pub fn track(name: &str) -> Track {
    Track {
        title: name.to_string(),
        page_url: format!("https://www.youtube.com/watch?v={}", name.replace(' ', "_")),
        thumbnail_url: None,
        duration: Duration::from_secs(180),
        source: AudioSource::Stream(name.to_string()),
    }
}

/// Resolves every query to [`track`], except queries starting with "missing".
pub fn stub_resolver() -> MockTrackResolver {
    let mut resolver = MockTrackResolver::new();
    resolver.expect_resolve().returning(|query| {
        if query.starts_with("missing") {
            Err(MusicError::ResolutionFailed(query.to_string()))
        } else {
            Ok(track(query))
        }
    });
    resolver
}

/// Lets spawned tasks (the player event loop, idle timers) run to completion.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

#[derive(Default)]
struct GuildRecord {
    channel: Option<ChannelId>,
    connects: usize,
    disconnects: usize,
    played: Vec<String>,
    notifiers: Vec<TrackEndNotifier>,
    paused: bool,
}

#[derive(Default)]
struct FakeVoiceInner {
    guilds: HashMap<GuildId, GuildRecord>,
    fail_connect: bool,
    failing_sources: Vec<String>,
}

/// In-memory voice transport that records every call.
#[derive(Clone, Default)]
pub struct FakeVoice {
    inner: Arc<Mutex<FakeVoiceInner>>,
}

impl FakeVoice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_connect(&self, fail: bool) {
        self.inner.lock().fail_connect = fail;
    }

    pub fn fail_source_containing(&self, needle: &str) {
        self.inner.lock().failing_sources.push(needle.to_string());
    }

    pub fn played(&self, guild_id: GuildId) -> Vec<String> {
        self.with_guild(guild_id, |g| g.played.clone())
    }

    pub fn connects(&self, guild_id: GuildId) -> usize {
        self.with_guild(guild_id, |g| g.connects)
    }

    pub fn disconnects(&self, guild_id: GuildId) -> usize {
        self.with_guild(guild_id, |g| g.disconnects)
    }

    pub fn is_paused(&self, guild_id: GuildId) -> bool {
        self.with_guild(guild_id, |g| g.paused)
    }

    /// Simulates the bot being kicked from its channel.
    pub fn kick(&self, guild_id: GuildId) {
        self.inner.lock().guilds.entry(guild_id).or_default().channel = None;
    }

    pub fn latest_notifier(&self, guild_id: GuildId) -> Option<TrackEndNotifier> {
        self.with_guild(guild_id, |g| g.notifiers.last().cloned())
    }

    /// Fires the completion signal of the most recently started stream.
    pub fn finish_latest(&self, guild_id: GuildId, error: Option<String>) {
        if let Some(notifier) = self.latest_notifier(guild_id) {
            notifier.finish(error);
        }
    }

    fn with_guild<T: Default>(&self, guild_id: GuildId, f: impl FnOnce(&GuildRecord) -> T) -> T {
        self.inner.lock().guilds.get(&guild_id).map(f).unwrap_or_default()
    }
}

#[async_trait]
impl VoiceConnector for FakeVoice {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceSession>, MusicError> {
        let mut inner = self.inner.lock();
        if inner.fail_connect {
            return Err(MusicError::ConnectFailed("missing permissions".into()));
        }
        let record = inner.guilds.entry(guild_id).or_default();
        record.channel = Some(channel_id);
        record.connects += 1;

        Ok(Arc::new(FakeSession {
            guild_id,
            voice: self.clone(),
        }))
    }
}

struct FakeSession {
    guild_id: GuildId,
    voice: FakeVoice,
}

impl FakeSession {
    fn update<T>(&self, f: impl FnOnce(&mut GuildRecord) -> T) -> T {
        f(self.voice.inner.lock().guilds.entry(self.guild_id).or_default())
    }
}

#[async_trait]
impl VoiceSession for FakeSession {
    async fn current_channel(&self) -> Option<ChannelId> {
        self.update(|g| g.channel)
    }

    async fn move_to(&self, channel_id: ChannelId) -> Result<(), MusicError> {
        self.update(|g| g.channel = Some(channel_id));
        Ok(())
    }

    async fn disconnect(&self) {
        self.update(|g| {
            g.channel = None;
            g.disconnects += 1;
        });
    }

    async fn play(&self, source: &AudioSource, on_end: TrackEndNotifier) -> Result<(), MusicError> {
        let locator = source.locator().to_string();
        let failing = self
            .voice
            .inner
            .lock()
            .failing_sources
            .iter()
            .any(|needle| locator.contains(needle.as_str()));
        if failing {
            return Err(MusicError::Playback(format!("cannot open {locator}")));
        }

        self.update(|g| {
            g.played.push(locator);
            g.notifiers.push(on_end);
            g.paused = false;
        });
        Ok(())
    }

    async fn stop(&self) {
        self.update(|g| g.paused = false);
    }

    async fn pause(&self) -> Result<(), MusicError> {
        self.update(|g| g.paused = true);
        Ok(())
    }

    async fn resume(&self) -> Result<(), MusicError> {
        self.update(|g| g.paused = false);
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        self.update(|g| !g.notifiers.is_empty() && !g.paused)
    }

    async fn is_paused(&self) -> bool {
        self.update(|g| g.paused)
    }
}

/// Keeps every status the controller emits.
#[derive(Default)]
pub struct RecordingSink {
    statuses: Mutex<Vec<(GuildId, Status)>>,
}

impl RecordingSink {
    pub fn statuses(&self, guild_id: GuildId) -> Vec<Status> {
        self.statuses
            .lock()
            .iter()
            .filter(|(g, _)| *g == guild_id)
            .map(|(_, s)| s.clone())
            .collect()
    }
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn notify(&self, guild_id: GuildId, status: Status) {
        self.statuses.lock().push((guild_id, status));
    }
}
