//! # Audio Module
//!
//! Queueing and playback for every guild the bot is in.
//!
//! ## Architecture
//!
//! ### [`queue`] - Playback Queue
//! - Upcoming tracks, the current track and the play history of one guild
//! - A track is always in exactly one of the three
//!
//! ### [`player`] - Playback Controller
//! - Per-guild state machine driving the queue and the voice session
//! - Commands for the same guild are serialized, guilds run independently
//! - Track completions arrive as events on a channel, never as callbacks
//!   that mutate state directly
//!
//! ### [`idle`] - Idle Presence Monitor
//! - Leaves a voice channel after the bot has been alone in it for a while
//!
//! ### [`voice`] / [`transport`] - Voice Seam
//! - Traits the controller talks to, and their songbird implementation
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use guild_jukebox::audio::player::PlaybackController;
//! use serenity::all::{ChannelId, GuildId};
//!
//! # async fn example(controller: std::sync::Arc<PlaybackController>) -> anyhow::Result<()> {
//! let guild_id = GuildId::new(123456789);
//!
//! controller
//!     .enqueue(guild_id, Some(ChannelId::new(42)), "lofi hip hop")
//!     .await?;
//! controller.pause(guild_id).await;
//! controller.resume(guild_id).await;
//! controller.skip(guild_id).await;
//! # Ok(())
//! # }
//! ```

pub mod idle;
pub mod player;
pub mod queue;
pub mod transport;
pub mod voice;
