// Entry point of the leveling bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (persistence)
// - `discord/` = Discord-specific adapters (commands, events)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands and event handlers

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::leveling::{LevelingService, MessageEvent};
use crate::discord::{announcements, role_sync, voice_sessions, weekly_task};
use crate::discord::{Data, Error};
use crate::infra::leveling::JsonGuildStore;
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Event handler for non-command Discord events. This is where messages,
/// reactions, and voice state changes turn into XP.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            // Ignore bot messages (including our own) and DMs
            if new_message.author.bot {
                return Ok(());
            }
            let Some(guild_id) = new_message.guild_id else {
                return Ok(());
            };

            let category_id = {
                ctx.cache
                    .guild(guild_id)
                    .and_then(|guild| {
                        guild
                            .channels
                            .get(&new_message.channel_id)
                            .and_then(|channel| channel.parent_id)
                    })
                    .map(|id| id.get())
            };
            let role_ids: Vec<u64> = new_message
                .member
                .as_ref()
                .map(|member| member.roles.iter().map(|role| role.get()).collect())
                .unwrap_or_default();

            let event = MessageEvent {
                guild_id: guild_id.get(),
                user_id: new_message.author.id.get(),
                channel_id: new_message.channel_id.get(),
                category_id,
                content_len: new_message.content.chars().count(),
                role_ids,
            };

            match data.leveling.handle_message(&event) {
                Ok(Some(level_up)) => {
                    tracing::info!(
                        user_id = level_up.user_id,
                        guild_id = level_up.guild_id,
                        old_level = level_up.old_level,
                        new_level = level_up.new_level,
                        "user leveled up"
                    );
                    role_sync::apply_member_roles(ctx, data, event.guild_id, event.user_id).await;
                    announcements::send_level_up(
                        ctx,
                        data,
                        &level_up,
                        Some(new_message.channel_id.get()),
                    )
                    .await;
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::error!(guild_id = event.guild_id, "message accrual failed: {err}");
                }
            }
        }
        serenity::FullEvent::ReactionAdd { add_reaction } => {
            // Star awards: ⭐ reaction from one member to another's message.
            if !add_reaction.emoji.unicode_eq("⭐") {
                return Ok(());
            }
            let (Some(guild_id), Some(giver), Some(recipient)) = (
                add_reaction.guild_id,
                add_reaction.user_id,
                add_reaction.message_author_id,
            ) else {
                return Ok(());
            };
            match data
                .leveling
                .award_star(guild_id.get(), giver.get(), recipient.get())
            {
                Ok(_awarded) => {}
                Err(err) => {
                    tracing::error!(guild_id = guild_id.get(), "star award failed: {err}");
                }
            }
        }
        serenity::FullEvent::VoiceStateUpdate { old, new } => {
            voice_sessions::handle_voice_state(ctx, data, old.as_ref(), new).await;
        }
        serenity::FullEvent::CacheReady { guilds } => {
            voice_sessions::seed_voice_sessions(ctx, data, guilds);
        }
        _ => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let token = std::env::var("DISCORD_TOKEN")
        .context("Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.")?;

    // Keep runtime state in a dedicated folder so the repo root stays tidy.
    let data_dir = std::env::var("LEVELBOT_DATA_DIR").unwrap_or_else(|_| "data".to_string());
    std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
    let store_path = std::path::Path::new(&data_dir).join("leveling.json");

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // The composition root: load the store, build the service, share it.

    let store = JsonGuildStore::load(&store_path)
        .with_context(|| format!("Failed to load guild store from {}", store_path.display()))?;
    let leveling = Arc::new(LevelingService::new(store));
    tracing::info!(
        guilds = leveling.guild_ids().len(),
        path = %store_path.display(),
        "guild store loaded"
    );

    let data = Data {
        leveling: Arc::clone(&leveling),
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILD_VOICE_STATES
        | serenity::GatewayIntents::GUILD_MESSAGE_REACTIONS
        | serenity::GatewayIntents::GUILD_PRESENCES; // For the invisible-status voice gate

    let weekly_leveling = Arc::clone(&leveling);
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                discord::commands::leveling::rank(),
                discord::commands::leveling::leaderboard(),
                discord::commands::leveling::weekly(),
                discord::commands::leveling::prestige(),
                discord::commands::leveling::givexp(),
                discord::commands::leveling::removexp(),
                discord::commands::leveling::setlevel(),
                discord::commands::leveling::syncroles(),
                discord::commands::leveling::weeklyreset(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                tracing::info!("registering slash commands");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                // Background weekly reset loop, one tick per minute.
                weekly_task::spawn(ctx.clone(), weekly_leveling);

                tracing::info!("bot is ready");
                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .context("Error creating client")?;

    // Run until Ctrl-C, then flush any debounced writes before exiting so the
    // last few XP awards survive the shutdown.
    tokio::select! {
        result = client.start() => {
            result.context("Error running bot")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received, flushing store");
        }
    }
    leveling.flush().await.context("Failed to flush guild store")?;

    Ok(())
}
