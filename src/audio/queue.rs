use std::{collections::VecDeque, time::Duration};
use thiserror::Error;
use tracing::{debug, info};

/// Where the audio for a track can be pulled from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Direct media URL, streamable as-is.
    Stream(String),
    /// Page URL the transport has to extract audio from itself.
    Page(String),
}

impl AudioSource {
    pub fn locator(&self) -> &str {
        match self {
            Self::Stream(url) | Self::Page(url) => url,
        }
    }
}

/// A resolved, playable track. Never mutated after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub title: String,
    pub page_url: String,
    pub thumbnail_url: Option<String>,
    pub duration: Duration,
    pub source: AudioSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("queue is empty")]
pub struct QueueEmpty;

/// Ordering state for a single guild: upcoming tracks, the one streaming
/// right now and the ones already played.
///
/// A track lives in exactly one of `items`, `current` or `history`. The
/// requeue helpers move `current` back to the head of `items` before
/// clearing it, so nothing is dropped or duplicated along the way.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    items: VecDeque<Track>,
    current: Option<Track>,
    history: Vec<Track>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the tail; returns the new queue length.
    pub fn push(&mut self, track: Track) -> usize {
        info!("➕ Queued: {}", track.title);
        self.items.push_back(track);
        self.items.len()
    }

    pub fn pop_front(&mut self) -> Result<Track, QueueEmpty> {
        self.items.pop_front().ok_or(QueueEmpty)
    }

    /// Inserts at the head. Successive calls stack, so the last call ends up
    /// at position 0.
    pub fn push_front(&mut self, track: Track) {
        self.items.push_front(track);
    }

    pub fn clear(&mut self) {
        self.items.clear();
        info!("🗑️ Queue cleared");
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Moves the head of the queue into `current` (FIFO).
    pub fn start_next(&mut self) -> Option<&Track> {
        let next = self.pop_front().ok()?;
        debug!("➡️ Next up: {}", next.title);
        self.current = Some(next);
        self.current.as_ref()
    }

    /// Moves `current` into the history.
    pub fn finish_current(&mut self) -> Option<&Track> {
        let finished = self.current.take()?;
        self.history.push(finished);
        self.history.last()
    }

    /// Puts `current` back at the head of the queue so it plays again.
    pub fn requeue_current(&mut self) -> bool {
        match self.current.take() {
            Some(track) => {
                self.push_front(track);
                true
            }
            None => false,
        }
    }

    /// Pops the most recent history entry onto the head of the queue.
    pub fn requeue_previous(&mut self) -> bool {
        match self.history.pop() {
            Some(track) => {
                self.push_front(track);
                true
            }
            None => false,
        }
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn history(&self) -> &[Track] {
        &self.history
    }

    pub fn upcoming(&self) -> impl Iterator<Item = &Track> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True when there is nothing queued, playing or remembered.
    pub fn is_vacant(&self) -> bool {
        self.items.is_empty() && self.current.is_none() && self.history.is_empty()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            current: self.current.clone(),
            upcoming: self.items.iter().cloned().collect(),
            history_len: self.history.len(),
            total_duration: self.calculate_total_duration(),
        }
    }

    fn calculate_total_duration(&self) -> Duration {
        let queue_duration: Duration = self.items.iter().map(|item| item.duration).sum();
        let current_duration = self
            .current
            .as_ref()
            .map(|c| c.duration)
            .unwrap_or_default();

        queue_duration + current_duration
    }
}

/// Read-only copy of a guild's queue for listing commands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueSnapshot {
    pub current: Option<Track>,
    pub upcoming: Vec<Track>,
    pub history_len: usize,
    pub total_duration: Duration,
}

impl QueueSnapshot {
    /// One page of upcoming tracks, 1-based.
    pub fn page(&self, page: usize, per_page: usize) -> &[Track] {
        let per_page = per_page.max(1);
        let start = (page.max(1) - 1) * per_page;
        if start >= self.upcoming.len() {
            return &[];
        }
        let end = (start + per_page).min(self.upcoming.len());
        &self.upcoming[start..end]
    }

    pub fn total_pages(&self, per_page: usize) -> usize {
        self.upcoming.len().div_ceil(per_page.max(1)).max(1)
    }
}
