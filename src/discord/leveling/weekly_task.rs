// Weekly leaderboard rotation.
//
// A background loop wakes once a minute and asks the core whether any guild
// is due. The actual rotation (pick winners, award bonus XP, clear weekly
// profiles, rotate the winner role, announce) is shared with the manual
// /weeklyreset command.

use crate::core::leveling::{LevelingError, LevelingService};
use crate::discord::announcements;
use crate::discord::commands::leveling::Data;
use crate::discord::role_sync;
use crate::infra::leveling::JsonGuildStore;
use chrono::Utc;
use poise::serenity_prelude as serenity;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub fn spawn(ctx: serenity::Context, leveling: Arc<LevelingService<JsonGuildStore>>) {
    tokio::spawn(async move {
        let data = Data {
            leveling: leveling.clone(),
        };
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let now = Utc::now();
            for guild_id in leveling.guild_ids() {
                if !leveling.weekly_due(guild_id, now) {
                    continue;
                }
                match execute_reset(&ctx, &data, guild_id).await {
                    Ok(true) => tracing::info!(guild_id, "weekly reset completed"),
                    Ok(false) => tracing::info!(guild_id, "weekly reset due but nothing to reset"),
                    Err(err) => tracing::error!(guild_id, "weekly reset failed: {err}"),
                }
            }
        }
    });
}

/// Run one weekly rotation for a guild. Returns `false` when nobody had
/// weekly XP (nothing is touched in that case).
pub async fn execute_reset(
    ctx: &serenity::Context,
    data: &Data,
    guild_id: u64,
) -> Result<bool, LevelingError> {
    let present = present_member_ids(ctx, guild_id);
    let Some(outcome) = data.leveling.reset_weekly(guild_id, &present, Utc::now())? else {
        return Ok(false);
    };

    if let Some(role_id) = outcome.role_id {
        rotate_winner_role(
            ctx,
            guild_id,
            role_id,
            &outcome.winners,
            outcome.role_all_winners,
        )
        .await;
    }

    // Bonus XP can push a winner over a level threshold.
    for level_up in &outcome.level_ups {
        role_sync::apply_member_roles(ctx, data, guild_id, level_up.user_id).await;
        announcements::send_level_up(ctx, data, level_up, outcome.channel_id).await;
    }

    if let Some(channel_id) = outcome.channel_id {
        announce_winners(ctx, channel_id, &outcome).await;
    }

    Ok(true)
}

fn present_member_ids(ctx: &serenity::Context, guild_id: u64) -> HashSet<u64> {
    match ctx.cache.guild(serenity::GuildId::new(guild_id)) {
        Some(guild) => guild
            .members
            .values()
            .filter(|member| !member.user.bot)
            .map(|member| member.user.id.get())
            .collect(),
        None => HashSet::new(),
    }
}

/// Move the winner role onto this week's winners and off everyone else.
async fn rotate_winner_role(
    ctx: &serenity::Context,
    guild_id: u64,
    role_id: u64,
    winners: &[crate::core::leveling::weekly::WeeklyWinner],
    all_winners: bool,
) {
    let new_holders: Vec<u64> = if all_winners {
        winners.iter().map(|w| w.user_id).collect()
    } else {
        winners.first().map(|w| vec![w.user_id]).unwrap_or_default()
    };

    let guild = serenity::GuildId::new(guild_id);
    let role = serenity::RoleId::new(role_id);
    let old_holders: Vec<u64> = {
        match ctx.cache.guild(guild) {
            Some(cached) => cached
                .members
                .values()
                .filter(|member| member.roles.contains(&role))
                .map(|member| member.user.id.get())
                .collect(),
            None => Vec::new(),
        }
    };

    for user_id in &old_holders {
        if new_holders.contains(user_id) {
            continue;
        }
        if let Err(err) = ctx
            .http
            .remove_member_role(
                guild,
                serenity::UserId::new(*user_id),
                role,
                Some("weekly leaderboard rotation"),
            )
            .await
        {
            tracing::warn!(guild_id, user_id, "failed to remove weekly role: {err}");
        }
    }
    for user_id in &new_holders {
        if old_holders.contains(user_id) {
            continue;
        }
        if let Err(err) = ctx
            .http
            .add_member_role(
                guild,
                serenity::UserId::new(*user_id),
                role,
                Some("weekly leaderboard winner"),
            )
            .await
        {
            tracing::warn!(guild_id, user_id, "failed to add weekly role: {err}");
        }
    }
}

async fn announce_winners(
    ctx: &serenity::Context,
    channel_id: u64,
    outcome: &crate::core::leveling::WeeklyResetOutcome,
) {
    let mut description = String::from("This week's most active members:\n\n");
    for (index, winner) in outcome.winners.iter().enumerate() {
        let medal = match index {
            0 => "🥇",
            1 => "🥈",
            2 => "🥉",
            _ => "🏅",
        };
        description.push_str(&format!(
            "{} <@{}> with **{}** XP\n",
            medal,
            winner.user_id,
            winner.xp.floor() as u64
        ));
    }
    description.push_str("\nWeekly XP has been reset. Good luck next week!");

    let embed = serenity::CreateEmbed::new()
        .title("🏆 Weekly Leaderboard Winners")
        .description(description)
        .color(0xffd700);

    let mut builder = serenity::CreateMessage::new().embed(embed);
    if outcome.ping_winners && !outcome.winners.is_empty() {
        let pings: Vec<String> = outcome
            .winners
            .iter()
            .map(|w| format!("<@{}>", w.user_id))
            .collect();
        builder = builder.content(pings.join(" "));
    }

    if let Err(err) = serenity::ChannelId::new(channel_id)
        .send_message(&ctx.http, builder)
        .await
    {
        tracing::warn!(channel_id, "failed to announce weekly winners: {err}");
    }
}
