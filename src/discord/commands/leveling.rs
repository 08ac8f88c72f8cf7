// Discord commands for the leveling system.
//
// This layer is THIN - it extracts primitive data from Discord types, calls
// the core service, and formats the response. No business logic lives here.

use crate::core::leveling::{LeaderboardEntry, LevelingError, LevelingService};
use crate::discord::role_sync;
use crate::discord::weekly_task;
use crate::infra::leveling::JsonGuildStore;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Type alias for our bot's context.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Data that's shared across all commands and event handlers.
pub struct Data {
    pub leveling: Arc<LevelingService<JsonGuildStore>>,
}

/// Show a member's level, XP, and activity counters.
#[poise::command(slash_command, guild_only)]
pub async fn rank(
    ctx: Context<'_>,
    #[description = "User to check (defaults to you)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let target = user.as_ref().unwrap_or_else(|| ctx.author());
    if target.bot {
        ctx.say("Bots don't have profiles! 🤖").await?;
        return Ok(());
    }

    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    let view = match ctx.data().leveling.profile_view(guild_id, target.id.get()) {
        Ok(view) => view,
        Err(LevelingError::NoProfile { .. }) => {
            ctx.say(format!("{} hasn't earned any XP here yet.", target.name))
                .await?;
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let level_span = (view.next_level_xp - view.level_floor_xp).max(1.0);
    let xp_into_level = (view.xp - view.level_floor_xp).max(0.0);
    let progress = xp_into_level / level_span;

    let mut embed = serenity::CreateEmbed::new()
        .title(format!("Profile of {}", target.name))
        .color(0x00ff00)
        .thumbnail(target.face())
        .field("Level", format!("**{}**", view.level), true)
        .field("Total XP", format!("**{}**", view.xp.floor() as u64), true)
        .field("Stars", format!("⭐ {}", view.stars), true)
        .field(
            "Progress",
            format!(
                "{}/{} XP\n{}",
                xp_into_level.floor() as u64,
                level_span.ceil() as u64,
                build_progress_bar(progress, 15)
            ),
            false,
        )
        .field("Messages", format!("{}", view.messages), true)
        .field(
            "Voice time",
            format_voice_time(view.voice_seconds),
            true,
        );

    if view.prestige > 0 {
        let badge = view.prestige_badge.unwrap_or_default();
        embed = embed.field(
            "Prestige",
            format!("{} {}", view.prestige, badge).trim().to_string(),
            true,
        );
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Show the server's XP leaderboard.
#[poise::command(slash_command, guild_only)]
pub async fn leaderboard(
    ctx: Context<'_>,
    #[description = "Page number (default: 1)"]
    #[min = 1]
    page: Option<u32>,
) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    let entries = ctx.data().leveling.leaderboard(guild_id, 1000);
    if entries.is_empty() {
        ctx.say("No one has earned XP yet! Start chatting to get on the leaderboard! 💬")
            .await?;
        return Ok(());
    }

    let embed = leaderboard_embed(
        &ctx,
        guild_id,
        "📊 Leaderboard",
        0xffd700,
        &entries,
        page.unwrap_or(1) as usize,
        |entry| format!("Level {} | {} XP", entry.level, entry.xp.floor() as u64),
    );
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Show this week's XP leaderboard.
#[poise::command(slash_command, guild_only)]
pub async fn weekly(
    ctx: Context<'_>,
    #[description = "Page number (default: 1)"]
    #[min = 1]
    page: Option<u32>,
) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    let entries = ctx.data().leveling.weekly_leaderboard(guild_id, 1000);
    if entries.is_empty() {
        ctx.say("Nobody has earned weekly XP yet this week.").await?;
        return Ok(());
    }

    let embed = leaderboard_embed(
        &ctx,
        guild_id,
        "📅 Weekly Leaderboard",
        0x3498db,
        &entries,
        page.unwrap_or(1) as usize,
        |entry| format!("{} XP this week", entry.xp.floor() as u64),
    );
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Take the next prestige rank (resets your level and XP).
#[poise::command(slash_command, guild_only)]
pub async fn prestige(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();
    let user_id = ctx.author().id.get();

    match ctx.data().leveling.prestige(guild_id, user_id) {
        Ok(new_prestige) => {
            ctx.say(format!(
                "🌟 You are now prestige **{}**! Your level and XP start over.",
                new_prestige
            ))
            .await?;
            role_sync::apply_member_roles(ctx.serenity_context(), ctx.data(), guild_id, user_id)
                .await;
        }
        Err(
            err @ (LevelingError::PrestigeDisabled
            | LevelingError::PrestigeTooLow { .. }
            | LevelingError::NoNextTier(_)
            | LevelingError::NoProfile { .. }),
        ) => {
            ctx.say(format!("Can't prestige: {err}")).await?;
        }
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

/// Grant XP to a user (admin only).
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn givexp(
    ctx: Context<'_>,
    #[description = "User to give XP to"] user: serenity::User,
    #[description = "Amount of XP to give"] amount: u64,
) -> Result<(), Error> {
    if user.bot {
        ctx.say("You can't give XP to bots!").await?;
        return Ok(());
    }
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    let level_up = ctx
        .data()
        .leveling
        .add_xp(guild_id, user.id.get(), amount as f64)?;

    if let Some(level_up) = &level_up {
        ctx.say(format!(
            "✅ Gave {} XP to {}.\n🎉 They leveled up to level {}!",
            amount, user.name, level_up.new_level
        ))
        .await?;
        role_sync::apply_member_roles(
            ctx.serenity_context(),
            ctx.data(),
            guild_id,
            user.id.get(),
        )
        .await;
    } else {
        ctx.say(format!("✅ Gave {} XP to {}.", amount, user.name))
            .await?;
    }
    Ok(())
}

/// Remove XP from a user (admin only). The cached level is left alone;
/// roles catch up on the next sync.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn removexp(
    ctx: Context<'_>,
    #[description = "User to remove XP from"] user: serenity::User,
    #[description = "Amount of XP to remove"] amount: u64,
) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    let new_xp = ctx
        .data()
        .leveling
        .remove_xp(guild_id, user.id.get(), amount as f64)?;
    ctx.say(format!(
        "✅ Removed {} XP from {}. They now have {} XP.",
        amount,
        user.name,
        new_xp.floor() as u64
    ))
    .await?;
    Ok(())
}

/// Set a user's level directly (admin only).
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn setlevel(
    ctx: Context<'_>,
    #[description = "User to set the level for"] user: serenity::User,
    #[description = "The level to set"] level: u32,
) -> Result<(), Error> {
    if user.bot {
        ctx.say("Bots don't level up!").await?;
        return Ok(());
    }
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    let new_xp = ctx
        .data()
        .leveling
        .set_level(guild_id, user.id.get(), level)?;
    ctx.say(format!(
        "✅ {} is now level {} ({} XP).",
        user.name,
        level,
        new_xp.floor() as u64
    ))
    .await?;

    role_sync::apply_member_roles(ctx.serenity_context(), ctx.data(), guild_id, user.id.get())
        .await;
    Ok(())
}

/// Re-apply level, prestige, and weekly-winner roles (admin only).
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn syncroles(
    ctx: Context<'_>,
    #[description = "User to sync (defaults to everyone)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    match user {
        Some(user) => {
            role_sync::apply_member_roles(
                ctx.serenity_context(),
                ctx.data(),
                guild_id,
                user.id.get(),
            )
            .await;
            ctx.say(format!("✅ Synced roles for {}.", user.name)).await?;
        }
        None => {
            // A full resync can take a while on a large guild.
            ctx.defer().await?;
            let processed =
                role_sync::resync_guild(ctx.serenity_context(), ctx.data(), guild_id).await;
            ctx.say(format!("✅ Synced roles for {} members.", processed))
                .await?;
        }
    }
    Ok(())
}

/// Trigger the weekly reset right now (admin only).
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn weeklyreset(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    ctx.defer().await?;
    let fired =
        weekly_task::execute_reset(ctx.serenity_context(), ctx.data(), guild_id).await?;
    if fired {
        ctx.say("✅ Weekly leaderboard reset.").await?;
    } else {
        ctx.say("Nothing to reset: nobody earned weekly XP.").await?;
    }
    Ok(())
}

/// Resolve a human-friendly display name for a user.
///
/// Cache only - no HTTP calls, so leaderboards render instantly. Falls back
/// to a mention so the entry is still identifiable.
pub fn resolve_display_name_cached(
    ctx: &serenity::Context,
    guild_id: u64,
    user_id: u64,
) -> String {
    let guild_id = serenity::GuildId::new(guild_id);
    let user_id = serenity::UserId::new(user_id);

    if let Some(guild) = ctx.cache.guild(guild_id) {
        if let Some(member) = guild.members.get(&user_id) {
            return member.display_name().to_string();
        }
    }
    if let Some(user) = ctx.cache.user(user_id) {
        return user.name.clone();
    }
    format!("<@{}>", user_id)
}

fn leaderboard_embed(
    ctx: &Context<'_>,
    guild_id: u64,
    title: &str,
    color: u32,
    entries: &[LeaderboardEntry],
    page: usize,
    line: impl Fn(&LeaderboardEntry) -> String,
) -> serenity::CreateEmbed {
    let per_page = 10;
    let total_pages = entries.len().div_ceil(per_page);
    let page = page.clamp(1, total_pages);
    let offset = (page - 1) * per_page;

    let mut description = String::new();
    let me = ctx.author().id.get();
    if let Some(rank) = entries.iter().position(|e| e.user_id == me).map(|i| i + 1) {
        description.push_str(&format!("Your rank: **#{}**\n\n", rank));
    } else {
        description.push_str("You are not ranked yet.\n\n");
    }

    for (index, entry) in entries.iter().skip(offset).take(per_page).enumerate() {
        let rank = offset + index + 1;
        let medal = match rank {
            1 => "🥇",
            2 => "🥈",
            3 => "🥉",
            _ => "  ",
        };
        let name = resolve_display_name_cached(ctx.serenity_context(), guild_id, entry.user_id);
        let name = if entry.user_id == me {
            format!("**{}** (You)", name)
        } else {
            name
        };
        description.push_str(&format!("{} **#{}** {}\n{}\n\n", medal, rank, name, line(entry)));
    }

    serenity::CreateEmbed::new()
        .title(title.to_string())
        .description(description)
        .color(color)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Page {}/{}",
            page, total_pages
        )))
}

pub fn build_progress_bar(progress: f64, length: usize) -> String {
    let clamped = progress.clamp(0.0, 1.0);
    let mut filled = (clamped * length as f64).round() as usize;
    if clamped > 0.0 && filled == 0 {
        filled = 1;
    }
    filled = filled.min(length);
    let bar = "▰".repeat(filled) + &"▱".repeat(length - filled);
    format!("{} ({}%)", bar, (clamped * 100.0).round() as u32)
}

fn format_voice_time(seconds: f64) -> String {
    let total_minutes = (seconds / 60.0) as u64;
    if total_minutes < 60 {
        format!("{}m", total_minutes)
    } else {
        format!("{}h {}m", total_minutes / 60, total_minutes % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_bar_clamps_and_fills() {
        assert!(build_progress_bar(0.0, 10).starts_with("▱▱▱▱▱▱▱▱▱▱"));
        assert!(build_progress_bar(1.5, 10).starts_with("▰▰▰▰▰▰▰▰▰▰"));
        // Any nonzero progress shows at least one block.
        assert!(build_progress_bar(0.001, 10).starts_with('▰'));
    }

    #[test]
    fn voice_time_formats_hours() {
        assert_eq!(format_voice_time(59.0 * 60.0), "59m");
        assert_eq!(format_voice_time(3660.0), "1h 1m");
    }
}
