// Applies role plans from the core to real guild members.
//
// The core hands back primitive role ids; this module checks which of them
// the bot can actually assign, prunes mappings that point at dead roles, and
// issues the REST calls. All failures are logged, never propagated, so a
// broken role mapping can't take down the event loop.

use crate::discord::commands::leveling::Data;
use poise::serenity_prelude as serenity;
use std::collections::HashSet;

/// Sync one member's level, prestige, and weekly-winner roles.
pub async fn apply_member_roles(
    ctx: &serenity::Context,
    data: &Data,
    guild_id: u64,
    user_id: u64,
) {
    let guild = serenity::GuildId::new(guild_id);
    let member = match guild.member(&ctx.http, serenity::UserId::new(user_id)).await {
        Ok(member) => member,
        Err(err) => {
            tracing::warn!(guild_id, user_id, "could not fetch member for role sync: {err}");
            return;
        }
    };
    if member.user.bot {
        return;
    }

    let held: HashSet<u64> = member.roles.iter().map(|role| role.get()).collect();
    let plan = data.leveling.plan_member_roles(guild_id, user_id, held);
    if plan.is_empty() {
        return;
    }

    // Split the plan into roles the bot can touch and roles it can't.
    // The cache guard must not live across the awaits below, so everything
    // is resolved to plain ids first.
    let (add, remove, bad): (Vec<u64>, Vec<u64>, Vec<u64>) = {
        let Some(cached) = ctx.cache.guild(guild) else {
            tracing::warn!(guild_id, "guild not cached, skipping role sync");
            return;
        };
        let bot_top = cached
            .members
            .get(&ctx.cache.current_user().id)
            .map(|bot| {
                bot.roles
                    .iter()
                    .filter_map(|role| cached.roles.get(role))
                    .map(|role| role.position)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);

        let mut bad = Vec::new();
        let mut assignable = |role_id: &u64| match cached.roles.get(&serenity::RoleId::new(*role_id)) {
            Some(role) if role.position < bot_top => true,
            _ => {
                bad.push(*role_id);
                false
            }
        };
        let add = plan.add.iter().filter(|r| assignable(r)).copied().collect();
        let remove = plan.remove.iter().filter(|r| assignable(r)).copied().collect();
        (add, remove, bad)
    };

    if !bad.is_empty() {
        let pruned = data.leveling.prune_level_roles(guild_id, &bad);
        tracing::warn!(
            guild_id,
            ?bad,
            pruned,
            "dropped unassignable roles from the sync plan"
        );
    }

    let add: Vec<serenity::RoleId> = add.into_iter().map(serenity::RoleId::new).collect();
    let remove: Vec<serenity::RoleId> = remove.into_iter().map(serenity::RoleId::new).collect();

    if !add.is_empty() {
        if let Err(err) = member.add_roles(&ctx.http, &add).await {
            tracing::warn!(guild_id, user_id, "failed to add roles: {err}");
            return;
        }
    }
    if !remove.is_empty() {
        if let Err(err) = member.remove_roles(&ctx.http, &remove).await {
            tracing::warn!(guild_id, user_id, "failed to remove roles: {err}");
        }
    }
}

/// Re-sync every cached member of a guild. Returns how many members were
/// processed.
pub async fn resync_guild(ctx: &serenity::Context, data: &Data, guild_id: u64) -> usize {
    let member_ids: Vec<u64> = {
        match ctx.cache.guild(serenity::GuildId::new(guild_id)) {
            Some(guild) => guild
                .members
                .values()
                .filter(|member| !member.user.bot)
                .map(|member| member.user.id.get())
                .collect(),
            None => Vec::new(),
        }
    };

    tracing::info!(guild_id, members = member_ids.len(), "starting full role resync");
    for (index, user_id) in member_ids.iter().enumerate() {
        apply_member_roles(ctx, data, guild_id, *user_id).await;
        // Stay polite to the gateway task on big guilds.
        if index % 10 == 9 {
            tokio::task::yield_now().await;
        }
    }
    tracing::info!(guild_id, members = member_ids.len(), "role resync finished");
    member_ids.len()
}
