//! Discord presentation: embeds for tracks and queues.

pub mod embeds;
