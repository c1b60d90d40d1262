// This is the entry point of the custom-commands bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (databases, bus)
// - `discord/` = Discord-specific adapters (commands, events)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands, event handlers and background loops

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::commands::{CommandNotice, CommandService, NoticePublisher};
use crate::discord::commands::custom_commands::CommandServiceHandle;
use crate::discord::events;
use crate::discord::{Data, Error};
use crate::infra::commands::{SqliteCommandStore, SqliteScheduledEventStore};
use crate::infra::events::EventBus;
use crate::infra::premium::StaticPremiumGuilds;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// How often the scheduler loop looks for due interval runs.
const SCHEDULER_POLL_SECS: u64 = 20;
/// Upper bound on interval runs claimed per poll.
const SCHEDULER_CLAIM_LIMIT: usize = 25;

/// Event handler for non-command Discord events.
/// This is where messages and reactions enter the evaluation pipeline.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            events::handle_message(ctx, data, new_message, false).await?;
        }
        serenity::FullEvent::MessageUpdate { new, .. } => {
            // Gateway edits without cached content carry no body to match on.
            if let Some(new) = new {
                events::handle_message(ctx, data, new, true).await?;
            }
        }
        serenity::FullEvent::ReactionAdd { add_reaction } => {
            events::handle_reaction(ctx, data, add_reaction, true).await?;
        }
        serenity::FullEvent::ReactionRemove { removed_reaction } => {
            events::handle_reaction(ctx, data, removed_reaction, false).await?;
        }
        _ => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Get Discord bot token from environment
    let token = std::env::var("DISCORD_TOKEN").expect(
        "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
    );

    let prefix = std::env::var("COMMAND_PREFIX").unwrap_or_else(|_| "!".to_string());

    // Keep runtime databases in a dedicated folder so the repo root stays tidy.
    let data_dir = "data";
    std::fs::create_dir_all(data_dir).expect("Failed to create data directory for SQLite files");
    let db_path = format!("{}/custom_commands.db", data_dir);

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Create our services with their dependencies.
    // This is the "composition root" where we wire everything together.

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect(&format!("sqlite://{}?mode=rwc", db_path))
        .await
        .expect("Failed to connect to commands DB");

    let command_store = SqliteCommandStore::new(pool.clone());
    command_store
        .migrate()
        .await
        .expect("Failed to migrate commands DB");

    let event_store = SqliteScheduledEventStore::new(pool.clone());
    event_store
        .migrate()
        .await
        .expect("Failed to migrate scheduled runs table");

    // In-process pub/sub bus: cache eviction + run-now signaling.
    let bus = Arc::new(EventBus::new());
    let notifier: Arc<dyn NoticePublisher> = bus.clone();

    let premium_raw = std::env::var("PREMIUM_GUILD_IDS").unwrap_or_default();
    let premium = Arc::new(StaticPremiumGuilds::from_env_list(&premium_raw));

    let command_service: CommandServiceHandle = Arc::new(CommandService::new(
        command_store,
        event_store,
        notifier,
        premium,
        prefix,
    ));

    // Create the data structure that will be shared across all commands
    let data = Data {
        commands: Arc::clone(&command_service),
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================
    // Configure the poise framework with our commands and settings.

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_MESSAGE_REACTIONS;

    let scheduler_service = Arc::clone(&command_service);
    let subscriber_service = Arc::clone(&command_service);
    let subscriber_bus = Arc::clone(&bus);

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            // Register all our commands here
            commands: vec![discord::commands::custom_commands::customcommands()],
            // Event handler for messages and other events
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                println!("🤖 Bot is starting up...");

                // Register slash commands globally (can take up to an hour to propagate)
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                println!("✅ Commands registered!");
                println!("🚀 Bot is ready!");

                // Background scheduler: claims due interval runs and executes
                // them. Pending events live in SQLite, so runs scheduled
                // before a restart fire on the first poll after it.
                let http = ctx.http.clone();
                tokio::spawn(async move {
                    use std::time::Duration as StdDuration;
                    use tokio::time::sleep;

                    loop {
                        let now = chrono::Utc::now();
                        match scheduler_service
                            .due_interval_runs(now, SCHEDULER_CLAIM_LIMIT)
                            .await
                        {
                            Ok(due) => {
                                for pending in due {
                                    match scheduler_service
                                        .run_interval_command(pending.guild_id, pending.local_id)
                                        .await
                                    {
                                        Ok(Some(run)) => {
                                            events::deliver_interval_run(
                                                &http,
                                                &scheduler_service,
                                                &run,
                                            )
                                            .await;
                                        }
                                        // Deleted/retyped/disabled since scheduling.
                                        Ok(None) => {}
                                        Err(err) => tracing::error!(
                                            guild_id = pending.guild_id,
                                            local_id = pending.local_id,
                                            "interval run failed: {}",
                                            err
                                        ),
                                    }
                                }
                            }
                            Err(err) => {
                                tracing::warn!("failed to claim due interval runs: {}", err)
                            }
                        }

                        scheduler_service.sweep_cooldowns();
                        sleep(StdDuration::from_secs(SCHEDULER_POLL_SECS)).await;
                    }
                });

                // Bus subscriber: evicts cached command sets and executes
                // operator-requested runs.
                let http = ctx.http.clone();
                let mut notices = subscriber_bus.subscribe(None);
                tokio::spawn(async move {
                    while let Some(notice) = notices.recv().await {
                        match notice {
                            CommandNotice::SetChanged { guild_id } => {
                                subscriber_service.invalidate_guild(guild_id);
                            }
                            CommandNotice::RunRequested { guild_id, local_id } => {
                                match subscriber_service
                                    .run_interval_command(guild_id, local_id)
                                    .await
                                {
                                    Ok(Some(run)) => {
                                        events::deliver_interval_run(
                                            &http,
                                            &subscriber_service,
                                            &run,
                                        )
                                        .await;
                                    }
                                    Ok(None) => {}
                                    Err(err) => tracing::error!(
                                        guild_id,
                                        local_id,
                                        "manual run failed: {}",
                                        err
                                    ),
                                }
                            }
                        }
                    }
                });

                Ok(data)
            })
        })
        .build();

    // Create the client and start the bot
    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .expect("Error creating client");

    client.start().await.expect("Error running bot");
}
