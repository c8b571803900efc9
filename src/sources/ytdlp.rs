use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use super::TrackResolver;
use crate::{
    audio::queue::{AudioSource, Track},
    error::MusicError,
};

/// Extractor yt-dlp reports for plain media links.
const GENERIC_EXTRACTOR: &str = "generic";

/// Information extracted by `yt-dlp --dump-json`.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    original_url: Option<String>,
    url: Option<String>,
    extractor: Option<String>,
}

/// Resolves queries by shelling out to `yt-dlp`.
pub struct YtDlpResolver {
    program: String,
    timeout: Duration,
    // Caps concurrent yt-dlp processes to avoid upstream rate limiting.
    rate_limiter: Semaphore,
}

impl YtDlpResolver {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            rate_limiter: Semaphore::new(3),
        }
    }

    /// What to hand to yt-dlp: links go through untouched, anything else
    /// becomes a single-result YouTube search.
    fn search_target(query: &str) -> String {
        if is_http_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{query}")
        }
    }

    async fn run(&self, target: &str) -> Result<String, String> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| e.to_string())?;

        let output = Command::new(&self.program)
            .args([
                "--no-playlist",
                "--dump-json",
                "-f",
                "bestaudio/best",
                "--no-warnings",
                target,
            ])
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| format!("yt-dlp timed out after {:?}", self.timeout))?
            .map_err(|e| format!("could not run {}: {e}", self.program))?;

        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<Track, MusicError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MusicError::ResolutionFailed(String::new()));
        }

        info!("🔍 Resolving: {}", query);
        let target = Self::search_target(query);

        let stdout = self.run(&target).await.map_err(|e| {
            warn!("yt-dlp failed for {}: {}", query, e);
            MusicError::ResolutionFailed(query.to_string())
        })?;

        parse_dump(query, &stdout)
    }
}

fn is_http_url(query: &str) -> bool {
    Url::parse(query)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Builds a track from the first JSON line yt-dlp printed.
fn parse_dump(query: &str, stdout: &str) -> Result<Track, MusicError> {
    let not_found = || MusicError::ResolutionFailed(query.to_string());

    let line = stdout
        .lines()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| {
            debug!("yt-dlp returned no entries for {}", query);
            not_found()
        })?;

    let info: YtDlpInfo = serde_json::from_str(line).map_err(|e| {
        warn!("Unreadable yt-dlp output for {}: {}", query, e);
        not_found()
    })?;

    let page_url = info
        .webpage_url
        .or(info.original_url)
        .ok_or_else(not_found)?;

    let source = match (info.extractor.as_deref(), info.url) {
        (Some(GENERIC_EXTRACTOR), Some(stream)) => AudioSource::Stream(stream),
        // Site stream URLs expire, so extract again right before playing.
        _ => AudioSource::Page(page_url.clone()),
    };

    Ok(Track {
        title: info.title.unwrap_or_else(|| "Unknown title".to_string()),
        page_url,
        thumbnail_url: info.thumbnail,
        duration: info
            .duration
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or_default(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn free_text_becomes_a_search() {
        assert_eq!(YtDlpResolver::search_target("never gonna"), "ytsearch1:never gonna");
        assert_eq!(
            YtDlpResolver::search_target("https://youtu.be/dQw4w9WgXcQ"),
            "https://youtu.be/dQw4w9WgXcQ"
        );
        assert_eq!(
            YtDlpResolver::search_target("ftp://example.com/a.mp3"),
            "ytsearch1:ftp://example.com/a.mp3"
        );
    }

    #[test]
    fn youtube_results_keep_the_page_as_source() {
        let stdout = r#"{"title":"Never Gonna Give You Up","duration":212.0,"thumbnail":"https://i.ytimg.com/vi/dQw4w9WgXcQ/hq.jpg","webpage_url":"https://www.youtube.com/watch?v=dQw4w9WgXcQ","url":"https://rr1.googlevideo.com/videoplayback?x","extractor":"youtube"}"#;

        let track = parse_dump("never gonna", stdout).unwrap();

        assert_eq!(track.title, "Never Gonna Give You Up");
        assert_eq!(track.duration, Duration::from_secs(212));
        assert_eq!(
            track.source,
            AudioSource::Page("https://www.youtube.com/watch?v=dQw4w9WgXcQ".into())
        );
        assert_eq!(
            track.thumbnail_url.as_deref(),
            Some("https://i.ytimg.com/vi/dQw4w9WgXcQ/hq.jpg")
        );
    }

    #[test]
    fn direct_links_stream_as_is() {
        let stdout = "\n{\"title\":\"a\",\"original_url\":\"https://cdn.example.com/a.mp3\",\"url\":\"https://cdn.example.com/a.mp3\",\"extractor\":\"generic\"}\n";

        let track = parse_dump("https://cdn.example.com/a.mp3", stdout).unwrap();

        assert_eq!(track.page_url, "https://cdn.example.com/a.mp3");
        assert_eq!(
            track.source,
            AudioSource::Stream("https://cdn.example.com/a.mp3".into())
        );
        assert_eq!(track.duration, Duration::ZERO);
    }

    #[test]
    fn empty_or_broken_output_is_a_resolution_failure() {
        assert_eq!(
            parse_dump("nothing", "").unwrap_err(),
            MusicError::ResolutionFailed("nothing".into())
        );
        assert_eq!(
            parse_dump("garbage", "not json").unwrap_err(),
            MusicError::ResolutionFailed("garbage".into())
        );
        assert_eq!(
            parse_dump("no page", r#"{"title":"x"}"#).unwrap_err(),
            MusicError::ResolutionFailed("no page".into())
        );
    }

    #[tokio::test]
    async fn missing_binary_is_reported_as_resolution_failure() {
        let resolver = YtDlpResolver::new("definitely-not-yt-dlp", Duration::from_secs(5));

        let err = resolver.resolve("anything").await.unwrap_err();

        assert_eq!(err, MusicError::ResolutionFailed("anything".into()));
    }
}
