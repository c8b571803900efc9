use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
#[cfg(test)]
mod test_support;
mod ui;

use crate::audio::{idle::IdlePresenceMonitor, player::PlaybackController, transport::SongbirdConnector};
use crate::bot::{announcer::ChannelAnnouncer, JukeboxBot};
use crate::config::Config;
use crate::sources::YtDlpResolver;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting Guild Jukebox v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let songbird = Songbird::serenity();
    let http = reqwest::Client::new();

    let resolver = Arc::new(YtDlpResolver::new(
        config.ytdlp_path.clone(),
        config.resolve_timeout(),
    ));
    let connector = Arc::new(SongbirdConnector::new(
        songbird.clone(),
        http,
        config.default_volume,
    ));
    let announcer = Arc::new(ChannelAnnouncer::new(Arc::new(Http::new(
        &config.discord_token,
    ))));

    let controller = PlaybackController::new(resolver, connector, announcer.clone());
    let monitor = Arc::new(IdlePresenceMonitor::new(
        controller.clone(),
        config.idle_timeout(),
    ));

    let handler = JukeboxBot::new(config.clone(), controller, monitor.clone(), announcer);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Graceful shutdown
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("⚠️ Shutdown signal received, closing...");
                monitor.shutdown();
                shard_manager.shutdown_all().await;
            }
            Err(e) => error!("Error registering Ctrl+C handler: {:?}", e),
        }
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("{} is not working", config.ytdlp_path);
    }
}
