// Voice state tracking.
//
// Sessions open on channel join and close on leave. A channel move closes
// the old session and opens a new one, so XP is settled per channel with the
// flags the member actually had there.

use crate::core::leveling::VoiceEvent;
use crate::discord::commands::leveling::Data;
use crate::discord::{announcements, role_sync};
use poise::serenity_prelude as serenity;

pub async fn handle_voice_state(
    ctx: &serenity::Context,
    data: &Data,
    old: Option<&serenity::VoiceState>,
    new: &serenity::VoiceState,
) {
    let Some(guild_id) = new.guild_id.map(|id| id.get()) else {
        return;
    };
    let user_id = new.user_id.get();
    if new
        .member
        .as_ref()
        .map(|member| member.user.bot)
        .unwrap_or(false)
    {
        return;
    }

    let old_channel = old.and_then(|state| state.channel_id).map(|id| id.get());
    let new_channel = new.channel_id.map(|id| id.get());

    match (old_channel, new_channel) {
        // Fresh join.
        (None, Some(_)) => {
            data.leveling
                .open_voice_session(guild_id, user_id, new.self_mute, new.self_deaf);
        }
        // Flag change within the same channel.
        (Some(from), Some(to)) if from == to => {
            data.leveling
                .update_voice_flags(guild_id, user_id, new.self_mute, new.self_deaf);
        }
        // Channel move: settle the old session, start a new one.
        (Some(from), Some(_)) => {
            settle_session(ctx, data, guild_id, user_id, from).await;
            data.leveling
                .open_voice_session(guild_id, user_id, new.self_mute, new.self_deaf);
        }
        // Leave.
        (Some(from), None) => {
            settle_session(ctx, data, guild_id, user_id, from).await;
        }
        (None, None) => {}
    }
}

/// Close the open session and run it through accrual.
async fn settle_session(
    ctx: &serenity::Context,
    data: &Data,
    guild_id: u64,
    user_id: u64,
    channel_id: u64,
) {
    let Some(session) = data.leveling.close_voice_session(guild_id, user_id) else {
        // Bot restarted mid-session; nothing to settle.
        return;
    };

    let (category_id, role_ids, invisible, alone) = {
        let Some(guild) = ctx.cache.guild(serenity::GuildId::new(guild_id)) else {
            return;
        };
        let category_id = guild
            .channels
            .get(&serenity::ChannelId::new(channel_id))
            .and_then(|channel| channel.parent_id)
            .map(|id| id.get());
        let role_ids: Vec<u64> = guild
            .members
            .get(&serenity::UserId::new(user_id))
            .map(|member| member.roles.iter().map(|role| role.get()).collect())
            .unwrap_or_default();
        let invisible = guild
            .presences
            .get(&serenity::UserId::new(user_id))
            .map(|presence| presence.status == serenity::OnlineStatus::Invisible)
            .unwrap_or(false);
        // Anyone else (non-bot) still in the channel the member just left?
        let alone = !guild.voice_states.iter().any(|(other, state)| {
            other.get() != user_id
                && state.channel_id.map(|id| id.get()) == Some(channel_id)
                && !guild
                    .members
                    .get(other)
                    .map(|member| member.user.bot)
                    .unwrap_or(false)
        });
        (category_id, role_ids, invisible, alone)
    };

    let event = VoiceEvent {
        guild_id,
        user_id,
        channel_id,
        category_id,
        elapsed_secs: session.joined_at.elapsed().as_secs_f64(),
        role_ids,
        self_mute: session.self_mute,
        self_deaf: session.self_deaf,
        invisible,
        alone,
    };

    match data.leveling.handle_voice_session(&event) {
        Ok(Some(level_up)) => {
            role_sync::apply_member_roles(ctx, data, guild_id, user_id).await;
            announcements::send_level_up(ctx, data, &level_up, None).await;
        }
        Ok(None) => {}
        Err(err) => {
            tracing::warn!(guild_id, user_id, "voice accrual failed: {err}");
        }
    }
}

/// Open sessions for members already in voice when the bot comes up.
/// Their time starts counting from now; the pre-start stretch is lost by
/// design since the cache is ephemeral.
pub fn seed_voice_sessions(ctx: &serenity::Context, data: &Data, guild_ids: &[serenity::GuildId]) {
    let mut seeded = 0usize;
    for guild_id in guild_ids {
        let states: Vec<(u64, bool, bool)> = {
            match ctx.cache.guild(*guild_id) {
                Some(guild) => guild
                    .voice_states
                    .values()
                    .filter(|state| state.channel_id.is_some())
                    .filter(|state| {
                        !guild
                            .members
                            .get(&state.user_id)
                            .map(|member| member.user.bot)
                            .unwrap_or(false)
                    })
                    .map(|state| (state.user_id.get(), state.self_mute, state.self_deaf))
                    .collect(),
                None => Vec::new(),
            }
        };
        for (user_id, self_mute, self_deaf) in states {
            data.leveling
                .open_voice_session(guild_id.get(), user_id, self_mute, self_deaf);
            seeded += 1;
        }
    }
    tracing::info!(sessions = seeded, "seeded voice sessions from cache");
}
