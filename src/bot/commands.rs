use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Every slash command the bot answers to.
pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        skip_command(),
        back_command(),
        pause_command(),
        resume_command(),
        rewind_command(),
        stop_command(),
        clear_command(),
        queue_command(),
        nowplaying_command(),
    ]
}

/// Registers global commands
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registers commands for a single guild (development)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Playback commands

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Play a song or add it to the queue")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "URL or search terms")
                .required(true),
        )
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skip to the next song")
}

fn back_command() -> CreateCommand {
    CreateCommand::new("back").description("Go back to the previous song")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pause playback")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resume paused playback")
}

fn rewind_command() -> CreateCommand {
    CreateCommand::new("rewind").description("Restart the current song")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Stop playback, clear the queue and leave")
}

// Queue commands

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Remove every upcoming song from the queue")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Show the queue")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Page number")
                .min_int_value(1),
        )
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Show the song that is playing")
}
