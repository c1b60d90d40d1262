// Discord commands for managing custom commands.
//
// **Notice the pattern:**
// 1. Extract primitive data from Discord types
// 2. Call core service
// 3. Format the response based on the result
//
// This layer is THIN - configuration errors come back from the core as
// descriptive messages and are relayed to the operator verbatim.

use crate::core::commands::{CommandError, CommandService, CustomCommand, TriggerKind};
use crate::infra::commands::{SqliteCommandStore, SqliteScheduledEventStore};
use poise::serenity_prelude as serenity;
use std::sync::Arc;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// The concrete service wiring used by the running bot.
pub type CommandServiceHandle =
    Arc<CommandService<SqliteCommandStore, SqliteScheduledEventStore>>;

/// Data that's shared across all commands.
pub struct Data {
    pub commands: CommandServiceHandle,
}

/// Manage this server's custom commands.
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    subcommands("list", "info", "new", "delete", "duplicate", "runnow")
)]
pub async fn customcommands(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// List this server's custom commands.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();

    let commands = ctx.data().commands.list_commands(guild_id).await?;
    if commands.is_empty() {
        ctx.say("No custom commands yet. Create one with `/customcommands new`.")
            .await?;
        return Ok(());
    }

    let mut lines = Vec::new();
    for cmd in &commands {
        lines.push(format!(
            "`#{}` {} {} {}",
            cmd.local_id,
            cmd.trigger_kind,
            summarize_trigger(cmd),
            if cmd.disabled { "(disabled)" } else { "" }
        ));
    }
    let mut body = lines.join("\n");
    if body.len() > 3900 {
        body.truncate(3900);
        body.push_str("\n…");
    }

    let embed = serenity::CreateEmbed::default()
        .title(format!("Custom commands ({})", commands.len()))
        .color(serenity::Color::BLURPLE)
        .description(body);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Show one custom command's configuration and run stats.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn info(
    ctx: Context<'_>,
    #[description = "Command id"] id: i64,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();

    let cmd = match ctx.data().commands.get_command(guild_id, id).await? {
        Some(cmd) => cmd,
        None => {
            ctx.say(format!("No custom command with id {}.", id)).await?;
            return Ok(());
        }
    };

    let mut embed = serenity::CreateEmbed::default()
        .title(format!("Custom command #{}", cmd.local_id))
        .color(serenity::Color::BLURPLE)
        .field("Trigger type", cmd.trigger_kind.to_string(), true)
        .field("Trigger", summarize_trigger(&cmd), true)
        .field("Status", if cmd.disabled { "Disabled" } else { "Enabled" }, true)
        .field("Responses", cmd.responses.len().to_string(), true)
        .field("Runs", cmd.run_count.to_string(), true);

    if let Some(group_id) = cmd.group_id {
        embed = embed.field("Group", group_id.to_string(), true);
    }
    if cmd.trigger_kind == TriggerKind::Interval {
        embed = embed.field(
            "Interval",
            format!("{} minutes", cmd.interval_minutes),
            true,
        );
        if let Some(next) = cmd.next_run {
            embed = embed.field("Next run", next.to_rfc3339(), true);
        }
        if let Some(last) = cmd.last_run {
            embed = embed.field("Last run", last.to_rfc3339(), true);
        }
    }
    if let (Some(err), true) = (&cmd.last_error, cmd.show_errors) {
        embed = embed.field("Last error", err.clone(), false);
    }
    if let Some(note) = &cmd.note {
        embed = embed.field("Note", note.clone(), false);
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Create a new custom command (disabled until configured).
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn new(
    ctx: Context<'_>,
    #[description = "Group to place the command in"] group: Option<i64>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();

    match ctx.data().commands.create_command(guild_id, group).await {
        Ok(cmd) => {
            ctx.say(format!(
                "✅ Created custom command `#{}`. It starts disabled; configure it from the control panel.",
                cmd.local_id
            ))
            .await?;
        }
        Err(err) => relay_command_error(ctx, err).await?,
    }
    Ok(())
}

/// Delete a custom command and any pending scheduled run.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn delete(
    ctx: Context<'_>,
    #[description = "Command id"] id: i64,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();

    match ctx.data().commands.delete_command(guild_id, id).await {
        Ok(()) => {
            ctx.say(format!("🗑️ Deleted custom command `#{}`.", id)).await?;
        }
        Err(err) => relay_command_error(ctx, err).await?,
    }
    Ok(())
}

/// Duplicate a custom command under a new id.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn duplicate(
    ctx: Context<'_>,
    #[description = "Command id"] id: i64,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();

    match ctx.data().commands.duplicate_command(guild_id, id).await {
        Ok(copy) => {
            ctx.say(format!(
                "✅ Duplicated `#{}` as `#{}` (disabled, triggers prefixed `duplicate_`).",
                id, copy.local_id
            ))
            .await?;
        }
        Err(err) => relay_command_error(ctx, err).await?,
    }
    Ok(())
}

/// Run an interval command now, outside its schedule.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn runnow(
    ctx: Context<'_>,
    #[description = "Command id"] id: i64,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();
    let user_id = ctx.author().id.get();

    match ctx
        .data()
        .commands
        .request_manual_run(guild_id, user_id, id)
        .await
    {
        Ok(true) => {
            ctx.say("▶️ Run queued.").await?;
        }
        Ok(false) => {
            // Informational, not an error.
            ctx.say("You're on cooldown, wait before trying again.").await?;
        }
        Err(CommandError::UnknownCommand) => {
            ctx.say("Only existing interval commands can be run this way.")
                .await?;
        }
        Err(err) => relay_command_error(ctx, err).await?,
    }
    Ok(())
}

/// Configuration errors are user-facing by design; everything else is also
/// worth telling the operator about, with a log line for the rest of us.
async fn relay_command_error(ctx: Context<'_>, err: CommandError) -> Result<(), Error> {
    if let CommandError::Storage(_) = err {
        tracing::error!(error = %err, "custom command operation failed");
        ctx.say("Something went wrong, try again later.").await?;
    } else {
        ctx.say(format!("❌ {}", err)).await?;
    }
    Ok(())
}

fn summarize_trigger(cmd: &CustomCommand) -> String {
    match cmd.trigger_kind {
        TriggerKind::Regex => {
            if cmd.regex_trigger.is_empty() {
                "_unset_".to_string()
            } else {
                format!("`{}`", cmd.regex_trigger)
            }
        }
        TriggerKind::Interval => format!("every {} min", cmd.interval_minutes),
        TriggerKind::Reaction => "on reaction".to_string(),
        TriggerKind::None => "-".to_string(),
        _ => {
            if cmd.text_trigger.is_empty() {
                "_unset_".to_string()
            } else {
                format!("`{}`", cmd.text_trigger)
            }
        }
    }
}
