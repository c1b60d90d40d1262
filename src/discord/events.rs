// Gateway event glue - feeds messages and reactions into the evaluation
// pipeline and delivers matched responses.
//
// Channel/thread resolution happens here so the core only ever sees plain
// ids: a thread is reported with its parent text channel, and the category
// is taken from the channel the message effectively lives in.

use crate::core::commands::{ChannelContext, IntervalRun, MatchedCommand};
use crate::discord::commands::custom_commands::CommandServiceHandle;
use crate::discord::{Data, Error};
use poise::serenity_prelude as serenity;
use tracing::{error, warn};

/// Resolve a channel into the context the scope filter needs, using the
/// gateway cache. Unknown channels degrade to a bare id, which only matters
/// for category-scoped commands.
fn resolve_channel(ctx: &serenity::Context, guild_id: u64, channel_id: u64) -> ChannelContext {
    let guild = match ctx.cache.guild(serenity::GuildId::new(guild_id)) {
        Some(guild) => guild,
        None => {
            return ChannelContext {
                channel_id,
                parent_channel_id: None,
                category_id: None,
            }
        }
    };

    if let Some(thread) = guild
        .threads
        .iter()
        .find(|thread| thread.id.get() == channel_id)
    {
        let parent_channel_id = thread.parent_id.map(|id| id.get());
        let category_id = parent_channel_id
            .and_then(|parent| guild.channels.get(&serenity::ChannelId::new(parent)))
            .and_then(|parent| parent.parent_id)
            .map(|id| id.get());
        return ChannelContext {
            channel_id,
            parent_channel_id,
            category_id,
        };
    }

    let category_id = guild
        .channels
        .get(&serenity::ChannelId::new(channel_id))
        .and_then(|channel| channel.parent_id)
        .map(|id| id.get());
    ChannelContext {
        channel_id,
        parent_channel_id: None,
        category_id,
    }
}

/// Evaluate a message (or an edit) and deliver matched responses.
pub async fn handle_message(
    ctx: &serenity::Context,
    data: &Data,
    msg: &serenity::Message,
    is_edit: bool,
) -> Result<(), Error> {
    // Ignore bot messages (including our own).
    if msg.author.bot {
        return Ok(());
    }
    let guild_id = match msg.guild_id {
        Some(id) => id.get(),
        None => return Ok(()),
    };

    let channel_ctx = resolve_channel(ctx, guild_id, msg.channel_id.get());
    let roles: Vec<u64> = msg
        .member
        .as_ref()
        .map(|member| member.roles.iter().map(|r| r.get()).collect())
        .unwrap_or_default();

    let matched = data
        .commands
        .evaluate_message(guild_id, channel_ctx, &roles, &msg.content, is_edit)
        .await?;

    for m in &matched {
        deliver_matched(ctx, &data.commands, m, msg.channel_id).await;
    }
    Ok(())
}

/// Evaluate a reaction add/remove event.
pub async fn handle_reaction(
    ctx: &serenity::Context,
    data: &Data,
    reaction: &serenity::Reaction,
    added: bool,
) -> Result<(), Error> {
    let guild_id = match reaction.guild_id {
        Some(id) => id.get(),
        None => return Ok(()),
    };
    let roles: Vec<u64> = match &reaction.member {
        Some(member) => {
            if member.user.bot {
                return Ok(());
            }
            member.roles.iter().map(|r| r.get()).collect()
        }
        None => Vec::new(),
    };

    let channel_ctx = resolve_channel(ctx, guild_id, reaction.channel_id.get());
    let matched = data
        .commands
        .evaluate_reaction(guild_id, channel_ctx, &roles, added)
        .await?;

    for m in &matched {
        deliver_matched(ctx, &data.commands, m, reaction.channel_id).await;
    }
    Ok(())
}

/// Send one matched command's response where the trigger happened.
async fn deliver_matched(
    ctx: &serenity::Context,
    service: &CommandServiceHandle,
    matched: &MatchedCommand,
    channel_id: serenity::ChannelId,
) {
    let cmd = &matched.command;
    let response = match service.pick_response(cmd) {
        Some(response) => response,
        None => return,
    };

    if let Err(err) = channel_id.say(&ctx.http, response).await {
        error!(
            guild_id = cmd.guild_id,
            local_id = cmd.local_id,
            "failed to deliver custom command response: {}",
            err
        );
        if let Err(record_err) = service
            .record_execution_error(cmd.guild_id, cmd.local_id, &err.to_string())
            .await
        {
            warn!("failed to record execution error: {}", record_err);
        }
        if cmd.show_errors {
            let notice = format!("Custom command #{} failed to run: {}", cmd.local_id, err);
            let _ = channel_id.say(&ctx.http, notice).await;
        }
    }
}

/// Deliver the output of an interval run to its context channel. Called by
/// the scheduler poll loop and the run-now bus subscriber.
pub async fn deliver_interval_run(
    http: &serenity::Http,
    service: &CommandServiceHandle,
    run: &IntervalRun,
) {
    if run.channel_id == 0 {
        warn!(
            guild_id = run.guild_id,
            local_id = run.local_id,
            "interval command has no context channel"
        );
        let _ = service
            .record_execution_error(run.guild_id, run.local_id, "no context channel configured")
            .await;
        return;
    }

    let channel = serenity::ChannelId::new(run.channel_id);
    if let Err(err) = channel.say(http, &run.response).await {
        error!(
            guild_id = run.guild_id,
            local_id = run.local_id,
            "failed to deliver interval command output: {}",
            err
        );
        if let Err(record_err) = service
            .record_execution_error(run.guild_id, run.local_id, &err.to_string())
            .await
        {
            warn!("failed to record execution error: {}", record_err);
        }
    }
}
