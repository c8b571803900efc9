use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::player::{Feedback, PlayerStatus},
    bot::JukeboxBot,
    ui::embeds,
};

/// Handles slash commands
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return reply(ctx, &command, "Music commands only work inside a server.").await;
    };

    info!(
        "📝 Command /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );
    bot.announcer.remember(guild_id, command.channel_id);

    let controller = &bot.controller;
    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "skip" => reply_feedback(ctx, &command, controller.skip(guild_id).await).await?,
        "back" => reply_feedback(ctx, &command, controller.back(guild_id).await).await?,
        "pause" => reply_feedback(ctx, &command, controller.pause(guild_id).await).await?,
        "resume" => reply_feedback(ctx, &command, controller.resume(guild_id).await).await?,
        "rewind" => reply_feedback(ctx, &command, controller.rewind(guild_id).await).await?,
        "stop" => {
            let feedback = controller.stop(guild_id).await;
            bot.monitor.forget(guild_id);
            reply_feedback(ctx, &command, feedback).await?
        }
        "clear" => reply_feedback(ctx, &command, controller.clear(guild_id).await).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        _ => reply(ctx, &command, "❌ Unknown command").await?,
    }

    Ok(())
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing query"))?;

    // Resolving can take a few seconds, longer than Discord waits for a reply
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let voice_channel = user_voice_channel(ctx, guild_id, command.user.id);
    let response = match bot.controller.enqueue(guild_id, voice_channel, query).await {
        Ok(enqueued) => EditInteractionResponse::new().embed(embeds::track_added_embed(&enqueued)),
        Err(e) => {
            if !e.is_user_facing() {
                warn!("/play failed in guild {}: {}", guild_id, e);
            }
            EditInteractionResponse::new().embed(embeds::error_embed(&e.to_string()))
        }
    };

    command.edit_response(&ctx.http, response).await?;
    Ok(())
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let page = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "page")
        .and_then(|opt| opt.value.as_i64())
        .and_then(|page| usize::try_from(page).ok())
        .unwrap_or(1);

    let snapshot = bot.controller.snapshot(guild_id).await;
    reply_embed(ctx, command, embeds::queue_embed(&snapshot, page)).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(current) = bot.controller.snapshot(guild_id).await.current else {
        return reply(ctx, command, &Feedback::NothingPlaying.to_string()).await;
    };

    let mut embed = embeds::now_playing_embed(&current);
    if bot.controller.transport_status(guild_id).await == PlayerStatus::Paused {
        embed = embed.field("State", "⏸️ Paused", true);
    }
    reply_embed(ctx, command, embed).await
}

async fn reply_feedback(
    ctx: &Context,
    command: &CommandInteraction,
    feedback: Feedback,
) -> Result<()> {
    reply(ctx, command, &feedback.to_string()).await
}

async fn reply(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().content(content),
            ),
        )
        .await?;
    Ok(())
}

async fn reply_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;
    Ok(())
}

/// Voice channel the user is in, from the gateway cache.
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
