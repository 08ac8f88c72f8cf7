// Role synchronization planning.
//
// `plan_roles` is a pure function over role-id sets; the Discord layer
// resolves the ids to real roles, applies the plan, and reports ids it could
// not resolve so they can be pruned from configuration.

use std::collections::HashSet;

use super::models::GuildConfig;

/// What the planner needs to know about one member.
#[derive(Debug, Clone)]
pub struct MemberRoleView {
    pub user_id: u64,
    pub level: u32,
    pub prestige: u32,
    pub held_roles: HashSet<u64>,
}

/// Concrete role ids to add and remove for one member. The two lists are
/// disjoint; a role desired by any rule is never scheduled for removal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RolePlan {
    pub add: Vec<u64>,
    pub remove: Vec<u64>,
}

impl RolePlan {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

pub fn plan_roles(view: &MemberRoleView, config: &GuildConfig) -> RolePlan {
    let mut desired: HashSet<u64> = HashSet::new();
    let mut removable: HashSet<u64> = HashSet::new();

    plan_level_roles(view, config, &mut desired, &mut removable);
    plan_prestige_roles(view, config, &mut desired, &mut removable);
    plan_weekly_role(view, config, &mut desired, &mut removable);

    let mut add: Vec<u64> = desired
        .iter()
        .filter(|role| !view.held_roles.contains(role))
        .copied()
        .collect();
    let mut remove: Vec<u64> = removable
        .iter()
        .filter(|role| !desired.contains(*role) && view.held_roles.contains(role))
        .copied()
        .collect();

    // Deterministic order for logging and tests.
    add.sort_unstable();
    remove.sort_unstable();
    RolePlan { add, remove }
}

fn plan_level_roles(
    view: &MemberRoleView,
    config: &GuildConfig,
    desired: &mut HashSet<u64>,
    removable: &mut HashSet<u64>,
) {
    // A prestiged member is exempt from the level ceiling when the guild
    // keeps level roles across prestige.
    let ceiling_lifted = view.prestige > 0 && config.keep_level_roles_on_prestige;

    let valid: Vec<(u32, u64)> = config
        .level_roles
        .iter()
        .filter(|(level, _)| ceiling_lifted || **level <= view.level)
        .map(|(level, role)| (*level, *role))
        .collect();

    if config.autoremove {
        // Only the single highest valid level's role is desired.
        if let Some((_, top_role)) = valid.last() {
            desired.insert(*top_role);
        }
        for role in config.level_roles.values() {
            removable.insert(*role);
        }
    } else {
        for (_, role) in &valid {
            desired.insert(*role);
        }
        // Only roles above the member's level are stripped.
        for (level, role) in &config.level_roles {
            if !ceiling_lifted && *level > view.level {
                removable.insert(*role);
            }
        }
    }
}

fn plan_prestige_roles(
    view: &MemberRoleView,
    config: &GuildConfig,
    desired: &mut HashSet<u64>,
    removable: &mut HashSet<u64>,
) {
    if config.stack_prestige_roles {
        // Every tier at or below the member's prestige stays; nothing is removed.
        for (tier, def) in &config.prestige_tiers {
            if *tier <= view.prestige {
                desired.insert(def.role_id);
            }
        }
    } else {
        for (tier, def) in &config.prestige_tiers {
            if *tier == view.prestige {
                desired.insert(def.role_id);
            } else {
                removable.insert(def.role_id);
            }
        }
    }
}

fn plan_weekly_role(
    view: &MemberRoleView,
    config: &GuildConfig,
    desired: &mut HashSet<u64>,
    removable: &mut HashSet<u64>,
) {
    let Some(role_id) = config.weekly.role_id else {
        return;
    };
    let winners = &config.weekly.last_winners;
    let is_winner = if config.weekly.role_all_winners {
        winners.contains(&view.user_id)
    } else {
        winners.first() == Some(&view.user_id)
    };
    if is_winner {
        desired.insert(role_id);
    } else {
        removable.insert(role_id);
    }
}
