//! # Sources
//!
//! Turns what a user typed into a playable [`Track`].
//!
//! The controller only sees the [`TrackResolver`] trait; [`YtDlpResolver`]
//! is the production implementation backed by the `yt-dlp` binary.

pub mod ytdlp;

use async_trait::async_trait;

use crate::{audio::queue::Track, error::MusicError};

pub use ytdlp::YtDlpResolver;

/// Resolves a free-text query or a URL to a single track.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Track, MusicError>;
}
