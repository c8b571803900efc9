use parking_lot::Mutex;
use serenity::model::id::{GuildId, UserId};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::audio::player::PlaybackController;

struct IdleTimer {
    id: u64,
    cancel: CancellationToken,
}

/// Leaves voice channels the bot has been left alone in.
///
/// Keeps at most one pending timer per guild. A timer that fires removes its
/// own record only, so it can never drop a newer timer scheduled after it
/// was cancelled.
///
/// Known limitation: a cancel that races with a timer already past its
/// sleep does not stop the disconnect. The disconnect happens at most once
/// and is not retried.
pub struct IdlePresenceMonitor {
    controller: Arc<PlaybackController>,
    timeout: Duration,
    timers: Arc<Mutex<HashMap<GuildId, IdleTimer>>>,
    next_id: AtomicU64,
}

impl IdlePresenceMonitor {
    pub fn new(controller: Arc<PlaybackController>, timeout: Duration) -> Self {
        Self {
            controller,
            timeout,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Feeds the current members of the bot's voice channel in `guild_id`.
    pub async fn on_membership_changed(&self, guild_id: GuildId, bot_user: UserId, members: &[UserId]) {
        if !self.controller.is_connected(guild_id).await {
            self.cancel(guild_id);
            return;
        }

        let alone = !members.is_empty() && members.iter().all(|member| *member == bot_user);
        if alone {
            self.schedule(guild_id);
        } else {
            self.cancel(guild_id);
        }
    }

    fn schedule(&self, guild_id: GuildId) {
        let mut timers = self.timers.lock();
        if timers.contains_key(&guild_id) {
            debug!("Idle timer already pending in guild {}", guild_id);
            return;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        timers.insert(
            guild_id,
            IdleTimer {
                id,
                cancel: cancel.clone(),
            },
        );
        drop(timers);

        info!(
            "🚪 Alone in voice in guild {}, leaving in {:?} unless someone joins",
            guild_id, self.timeout
        );

        let controller = self.controller.clone();
        let timers = self.timers.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Idle timer {} cancelled in guild {}", id, guild_id);
                    return;
                }
                _ = tokio::time::sleep(timeout) => {}
            }

            {
                let mut timers = timers.lock();
                if timers.get(&guild_id).is_some_and(|timer| timer.id == id) {
                    timers.remove(&guild_id);
                }
            }

            if controller.idle_disconnect(guild_id).await {
                info!("⏰ Idle timeout reached in guild {}", guild_id);
            }
        });
    }

    /// Cancels the pending timer of `guild_id`, if any.
    pub fn cancel(&self, guild_id: GuildId) {
        if let Some(timer) = self.timers.lock().remove(&guild_id) {
            timer.cancel.cancel();
            debug!("Idle timer {} dropped in guild {}", timer.id, guild_id);
        }
    }

    /// The bot left voice in `guild_id`; nothing is left to watch.
    pub fn forget(&self, guild_id: GuildId) {
        self.cancel(guild_id);
    }

    pub fn has_pending(&self, guild_id: GuildId) -> bool {
        self.timers.lock().contains_key(&guild_id)
    }

    /// Cancels every pending timer.
    pub fn shutdown(&self) {
        for (_, timer) in self.timers.lock().drain() {
            timer.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::player::{Status, LEFT_WHILE_IDLE},
        test_support::{settle, stub_resolver, FakeVoice, RecordingSink},
    };
    use pretty_assertions::assert_eq;
    use serenity::model::id::ChannelId;

    const GUILD: GuildId = GuildId::new(1);
    const VOICE: ChannelId = ChannelId::new(10);
    const BOT: UserId = UserId::new(100);
    const LISTENER: UserId = UserId::new(200);
    const TIMEOUT: Duration = Duration::from_secs(300);

    struct Harness {
        controller: Arc<PlaybackController>,
        monitor: IdlePresenceMonitor,
        voice: FakeVoice,
        sink: Arc<RecordingSink>,
    }

    async fn connected() -> Harness {
        let voice = FakeVoice::new();
        let sink = Arc::new(RecordingSink::default());
        let controller = PlaybackController::new(
            Arc::new(stub_resolver()),
            Arc::new(voice.clone()),
            sink.clone(),
        );
        controller
            .enqueue(GUILD, Some(VOICE), "a")
            .await
            .expect("enqueue");

        Harness {
            monitor: IdlePresenceMonitor::new(controller.clone(), TIMEOUT),
            controller,
            voice,
            sink,
        }
    }

    async fn wait(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
        settle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn rejoin_before_timeout_keeps_the_bot() {
        let h = connected().await;

        h.monitor.on_membership_changed(GUILD, BOT, &[BOT]).await;
        assert!(h.monitor.has_pending(GUILD));

        wait(299).await;
        h.monitor
            .on_membership_changed(GUILD, BOT, &[BOT, LISTENER])
            .await;
        assert!(!h.monitor.has_pending(GUILD));

        wait(60).await;
        assert_eq!(h.voice.disconnects(GUILD), 0);
        assert!(h.controller.is_connected(GUILD).await);
    }

    #[tokio::test(start_paused = true)]
    async fn alone_for_the_full_timeout_disconnects_once() {
        let h = connected().await;

        h.monitor.on_membership_changed(GUILD, BOT, &[BOT]).await;
        h.monitor.on_membership_changed(GUILD, BOT, &[BOT]).await;
        wait(301).await;

        assert_eq!(h.voice.disconnects(GUILD), 1);
        assert!(!h.controller.is_connected(GUILD).await);
        assert!(!h.monitor.has_pending(GUILD));
        assert_eq!(
            h.sink.statuses(GUILD).last(),
            Some(&Status::Message(LEFT_WHILE_IDLE.to_string()))
        );

        // Not connected anymore, so being alone schedules nothing.
        h.monitor.on_membership_changed(GUILD, BOT, &[BOT]).await;
        assert!(!h.monitor.has_pending(GUILD));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_does_not_remove_its_successor() {
        let h = connected().await;

        h.monitor.on_membership_changed(GUILD, BOT, &[BOT]).await;
        wait(100).await;
        h.monitor
            .on_membership_changed(GUILD, BOT, &[BOT, LISTENER])
            .await;
        wait(100).await;
        h.monitor.on_membership_changed(GUILD, BOT, &[BOT]).await;

        // The first timer would have fired here.
        wait(101).await;
        assert_eq!(h.voice.disconnects(GUILD), 0);
        assert!(h.monitor.has_pending(GUILD));

        wait(200).await;
        assert_eq!(h.voice.disconnects(GUILD), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_scheduled_without_a_connection() {
        let voice = FakeVoice::new();
        let controller = PlaybackController::new(
            Arc::new(stub_resolver()),
            Arc::new(voice.clone()),
            Arc::new(RecordingSink::default()),
        );
        let monitor = IdlePresenceMonitor::new(controller, TIMEOUT);

        monitor.on_membership_changed(GUILD, BOT, &[BOT]).await;
        assert!(!monitor.has_pending(GUILD));

        // An empty member list is not "alone".
        let h = connected().await;
        h.monitor.on_membership_changed(GUILD, BOT, &[]).await;
        assert!(!h.monitor.has_pending(GUILD));
    }

    #[tokio::test(start_paused = true)]
    async fn forget_and_shutdown_cancel_pending_timers() {
        let h = connected().await;

        h.monitor.on_membership_changed(GUILD, BOT, &[BOT]).await;
        h.monitor.forget(GUILD);
        assert!(!h.monitor.has_pending(GUILD));

        h.monitor.on_membership_changed(GUILD, BOT, &[BOT]).await;
        h.monitor.shutdown();
        wait(400).await;

        assert_eq!(h.voice.disconnects(GUILD), 0);
    }
}
