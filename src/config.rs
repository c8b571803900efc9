use ::config::{
    builder::{ConfigBuilder, DefaultState},
    Environment, File,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Optional file layered between the defaults and the environment
/// (`jukebox.toml`, `jukebox.json`, ...).
const CONFIG_FILE: &str = "jukebox";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Registers commands in one guild only, for development

    // Audio
    pub default_volume: f32,
    pub idle_timeout_secs: u64,

    // Sources
    pub ytdlp_path: String,
    pub resolve_timeout_secs: u64,
}

impl Config {
    /// Loads `.env`, then layers defaults < `jukebox.*` < environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        Self::from_builder(
            Self::defaults()?
                .add_source(File::with_name(CONFIG_FILE).required(false))
                .add_source(Environment::default().try_parsing(true)),
        )
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let defaults = Self::default();
        Ok(::config::Config::builder()
            .set_default("default_volume", f64::from(defaults.default_volume))?
            .set_default("idle_timeout_secs", defaults.idle_timeout_secs)?
            .set_default("ytdlp_path", defaults.ytdlp_path)?
            .set_default("resolve_timeout_secs", defaults.resolve_timeout_secs)?)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - The Discord token must not be empty
    /// - Volume must be between 0.0 and 2.0
    /// - Idle and resolve timeouts must be greater than zero
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must be set");
        }

        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.idle_timeout_secs == 0 {
            anyhow::bail!("Idle timeout must be greater than 0");
        }

        if self.resolve_timeout_secs == 0 {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    /// Returns a summary of the current configuration for logging.
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: commands {}\n  \
            Audio: {}% vol, leave after {}s alone\n  \
            Sources: {} ({}s timeout)",
            self.guild_id
                .map_or("global".to_string(), |id| format!("in guild {id}")),
            (self.default_volume * 100.0).round() as u32,
            self.idle_timeout_secs,
            self.ytdlp_path,
            self.resolve_timeout_secs,
        )
    }
}

/// Default configuration values.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: None,

            default_volume: 0.5,
            idle_timeout_secs: 300,

            ytdlp_path: "yt-dlp".to_string(),
            resolve_timeout_secs: 30,
        }
    }
}
