use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{
    player::Enqueued,
    queue::{QueueSnapshot, Track},
};

pub const QUEUE_PAGE_SIZE: usize = 10;

/// Standard colour palette for the bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

const STANDARD_FOOTER: &str = "🎵 Guild Jukebox";

/// Title linked to the track page, thumbnail and duration.
fn track_embed(track: &Track) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(&track.title)
        .url(&track.page_url)
        .field("⏱️ Duration", format_track_duration(track.duration), true);

    if let Some(thumbnail) = &track.thumbnail_url {
        embed = embed.thumbnail(thumbnail);
    }
    embed
}

pub fn now_playing_embed(track: &Track) -> CreateEmbed {
    track_embed(track)
        .author(CreateEmbedAuthor::new("🎵 Now Playing"))
        .color(colors::MUSIC_PURPLE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn track_added_embed(enqueued: &Enqueued) -> CreateEmbed {
    let (author, position) = if enqueued.started {
        ("▶️ Playing", "Now".to_string())
    } else {
        ("✅ Added to Queue", format!("#{}", enqueued.position))
    };

    track_embed(&enqueued.track)
        .author(CreateEmbedAuthor::new(author))
        .field("📍 Position", position, true)
        .color(colors::SUCCESS_GREEN)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn queue_embed(snapshot: &QueueSnapshot, page: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Queue")
        .color(colors::INFO_BLUE);

    if snapshot.current.is_none() && snapshot.upcoming.is_empty() {
        return embed
            .description("😴 **The queue is empty**\n\n💡 Use `/play <song>` to add music")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if let Some(current) = &snapshot.current {
        embed = embed.field(
            "▶️ Playing",
            format!("**{}** `[{}]`", current.title, format_track_duration(current.duration)),
            false,
        );
    }

    let lines = queue_lines(snapshot, page);
    if !lines.is_empty() {
        embed = embed.field("⏭️ Up Next", lines, false);
    }

    let page = page.clamp(1, snapshot.total_pages(QUEUE_PAGE_SIZE));
    embed
        .field("🎶 Upcoming", snapshot.upcoming.len().to_string(), true)
        .field("⏮️ Played", snapshot.history_len.to_string(), true)
        .field("⏱️ Total", format_total_duration(snapshot.total_duration), true)
        .footer(CreateEmbedFooter::new(format!(
            "Page {}/{} • {}",
            page,
            snapshot.total_pages(QUEUE_PAGE_SIZE),
            STANDARD_FOOTER
        )))
}

pub fn error_embed(description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error")
        .description(description)
        .color(colors::ERROR_RED)
}

fn queue_lines(snapshot: &QueueSnapshot, page: usize) -> String {
    let first = (page.max(1) - 1) * QUEUE_PAGE_SIZE;
    snapshot
        .page(page, QUEUE_PAGE_SIZE)
        .iter()
        .enumerate()
        .map(|(i, track)| {
            format!(
                "**{}**. {} `[{}]`\n",
                first + i + 1,
                track.title,
                format_track_duration(track.duration)
            )
        })
        .collect()
}

/// `m:ss`, or `h:mm:ss` past the hour. Zero means the length is unknown.
fn format_track_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    if total_seconds == 0 {
        return "🔴 Live".to_string();
    }
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

fn format_total_duration(duration: Duration) -> String {
    humantime::format_duration(Duration::from_secs(duration.as_secs())).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::track;
    use pretty_assertions::assert_eq;

    fn snapshot_of(names: &[&str]) -> QueueSnapshot {
        QueueSnapshot {
            current: Some(track("now")),
            upcoming: names.iter().map(|name| track(name)).collect(),
            history_len: 2,
            total_duration: Duration::from_secs(180 * (names.len() as u64 + 1)),
        }
    }

    #[test]
    fn track_durations_use_clock_format() {
        assert_eq!(format_track_duration(Duration::from_secs(65)), "1:05");
        assert_eq!(format_track_duration(Duration::from_secs(3725)), "1:02:05");
        assert_eq!(format_track_duration(Duration::ZERO), "🔴 Live");
    }

    #[test]
    fn total_duration_is_human_readable() {
        assert_eq!(format_total_duration(Duration::from_millis(540_400)), "9m");
    }

    #[test]
    fn queue_lines_number_across_pages() {
        let names: Vec<String> = (1..=12).map(|i| format!("t{i}")).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let snapshot = snapshot_of(&names);

        assert_eq!(
            queue_lines(&snapshot, 2),
            "**11**. t11 `[3:00]`\n**12**. t12 `[3:00]`\n"
        );
        assert_eq!(queue_lines(&snapshot, 3), "");
    }

    #[test]
    fn now_playing_links_the_track_page() {
        let mut song = track("song a");
        song.thumbnail_url = Some("https://i.ytimg.com/a.jpg".into());

        let embed = serde_json::to_value(now_playing_embed(&song)).unwrap();

        assert_eq!(embed["title"], "song a");
        assert_eq!(embed["url"], "https://www.youtube.com/watch?v=song_a");
        assert_eq!(embed["thumbnail"]["url"], "https://i.ytimg.com/a.jpg");
    }

    #[test]
    fn added_embed_shows_queue_position() {
        let enqueued = Enqueued {
            track: track("b"),
            position: 3,
            started: false,
        };

        let embed = serde_json::to_value(track_added_embed(&enqueued)).unwrap();

        assert_eq!(embed["author"]["name"], "✅ Added to Queue");
        assert_eq!(embed["fields"][1]["value"], "#3");
    }
}
