// Level-up announcements.
//
// Announcement failures are logged and swallowed; a missing channel or
// closed DMs must never break the accrual path.

use crate::discord::commands::leveling::Data;
use crate::core::leveling::LevelUpEvent;
use poise::serenity_prelude as serenity;
use rand::seq::SliceRandom;

/// Announce a level-up according to the guild's notification settings.
///
/// Preference order: configured announcement channel, then DM if enabled,
/// then the channel the triggering message came from (when there is one).
pub async fn send_level_up(
    ctx: &serenity::Context,
    data: &Data,
    level_up: &LevelUpEvent,
    fallback_channel: Option<u64>,
) {
    let settings = data.leveling.notify_settings(level_up.guild_id);

    let user_text = if settings.mention {
        format!("<@{}>", level_up.user_id)
    } else {
        resolve_name(ctx, level_up.guild_id, level_up.user_id)
    };
    let message = settings
        .template
        .replace("{user}", &user_text)
        .replace("{level}", &level_up.new_level.to_string());

    let embed = serenity::CreateEmbed::new()
        .title("🎉 Level up!")
        .description(format!("{}\n\n{}", message, random_flavor_line()))
        .color(level_color(level_up.new_level))
        .field("Level", format!("{}", level_up.new_level), true)
        .field(
            "Total XP",
            format!("{}", level_up.total_xp.floor() as u64),
            true,
        );

    let channel = settings.channel_id.or(fallback_channel);
    if let Some(channel_id) = channel {
        let builder = serenity::CreateMessage::new().embed(embed.clone());
        if let Err(err) = serenity::ChannelId::new(channel_id)
            .send_message(&ctx.http, builder)
            .await
        {
            tracing::warn!(
                guild_id = level_up.guild_id,
                channel_id,
                "failed to announce level-up: {err}"
            );
        }
    }

    if settings.dm {
        let user_id = serenity::UserId::new(level_up.user_id);
        let result = async {
            let dm = user_id.create_dm_channel(&ctx.http).await?;
            dm.send_message(&ctx.http, serenity::CreateMessage::new().embed(embed))
                .await
        }
        .await;
        if let Err(err) = result {
            // Closed DMs are routine, keep this quiet.
            tracing::debug!(
                guild_id = level_up.guild_id,
                user_id = level_up.user_id,
                "could not DM level-up: {err}"
            );
        }
    }
}

fn resolve_name(ctx: &serenity::Context, guild_id: u64, user_id: u64) -> String {
    let guild_id = serenity::GuildId::new(guild_id);
    let user_id = serenity::UserId::new(user_id);
    if let Some(guild) = ctx.cache.guild(guild_id) {
        if let Some(member) = guild.members.get(&user_id) {
            return member.display_name().to_string();
        }
    }
    format!("<@{}>", user_id)
}

/// Color shifts with level bracket so regulars can spot a big milestone.
pub fn level_color(level: u32) -> u32 {
    match level {
        0..=4 => 0x95a5a6,
        5..=9 => 0x2ecc71,
        10..=19 => 0x3498db,
        20..=34 => 0x9b59b6,
        35..=49 => 0xe67e22,
        _ => 0xf1c40f,
    }
}

fn random_flavor_line() -> &'static str {
    const LINES: &[&str] = &[
        "Keep it up! 💪",
        "On a roll! 🔥",
        "The grind pays off! ⚡",
        "Onwards and upwards! 🚀",
        "Nothing can stop you! 🌟",
    ];
    LINES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("Keep it up! 💪")
}
