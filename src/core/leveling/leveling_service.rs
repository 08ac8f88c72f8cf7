// Orchestration for the leveling engine: counters, eligibility, accrual,
// cooldown stamping, level-up detection, admin XP operations, and the weekly
// rotation. No Discord types appear here; the discord layer translates
// gateway events into the plain structs this service consumes.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::accrual::{message_delta, voice_delta};
use super::activity::{ActivityCache, VoiceSession};
use super::eligibility::{message_eligible, voice_eligible};
use super::models::{GuildConfig, LevelUpEvent, MessageEvent, VoiceEvent};
use super::roles::{plan_roles, MemberRoleView, RolePlan};
use super::store::{GuildStore, StoreError};
use super::weekly::{next_reset_after, rank_weekly, should_fire, WeeklyResetOutcome};

#[derive(Debug, Error)]
pub enum LevelingError {
    #[error("invalid user or guild ID")]
    InvalidId,

    #[error("user {user_id} has no profile in guild {guild_id}")]
    NoProfile { guild_id: u64, user_id: u64 },

    #[error("prestige is not enabled in this guild")]
    PrestigeDisabled,

    #[error("level {have} is below the prestige requirement of {need}")]
    PrestigeTooLow { have: u32, need: u32 },

    #[error("no prestige tier is configured beyond {0}")]
    NoNextTier(u32),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// A member's profile as shown by rank/profile displays. Reading one is
/// self-healing: a cached level that lags the XP-derived level is recomputed
/// and written back.
#[derive(Debug, Clone)]
pub struct ProfileView {
    pub user_id: u64,
    pub xp: f64,
    pub level: u32,
    pub prestige: u32,
    pub prestige_badge: Option<String>,
    pub messages: u64,
    pub voice_seconds: f64,
    pub stars: u64,
    /// XP floor of the current level and requirement for the next one,
    /// for progress bar rendering.
    pub level_floor_xp: f64,
    pub next_level_xp: f64,
}

#[derive(Debug, Clone)]
pub struct LeaderboardEntry {
    pub user_id: u64,
    pub xp: f64,
    pub level: u32,
}

/// Level-up notification settings, copied out for the announcement path.
#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub channel_id: Option<u64>,
    pub dm: bool,
    pub mention: bool,
    pub template: String,
}

enum AccrualOutcome {
    /// Counters updated, XP denied by the eligibility gate.
    CountedOnly,
    /// XP awarded, possibly with a level-up.
    Awarded(Option<LevelUpEvent>),
}

pub struct LevelingService<S: GuildStore> {
    store: S,
    activity: ActivityCache,
}

impl<S: GuildStore> LevelingService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            activity: ActivityCache::new(),
        }
    }

    fn validate_ids(user_id: u64, guild_id: u64) -> Result<(), LevelingError> {
        if user_id == 0 || guild_id == 0 {
            Err(LevelingError::InvalidId)
        } else {
            Ok(())
        }
    }

    /// Process one guild message.
    ///
    /// Counters always increase (even on an ineligible message); only the XP
    /// award itself is gated. The cooldown stamp is recorded after a
    /// successful accrual, never on mere eligibility.
    pub fn handle_message(
        &self,
        event: &MessageEvent,
    ) -> Result<Option<LevelUpEvent>, LevelingError> {
        Self::validate_ids(event.user_id, event.guild_id)?;

        let since = self
            .activity
            .since_last_message(event.guild_id, event.user_id);

        let outcome = self.store.with_guild_mut(event.guild_id, |config| {
            // Counters are unconditional; only the XP award is gated.
            config.profile_mut(event.user_id).messages += 1;
            if config.weekly.enabled {
                config.weekly_profile_mut(event.user_id).messages += 1;
            }

            if !message_eligible(event, config, since) {
                return AccrualOutcome::CountedOnly;
            }

            let delta = message_delta(event, config, &mut rand::thread_rng());
            AccrualOutcome::Awarded(Self::apply_delta(
                config,
                event.guild_id,
                event.user_id,
                &event.role_ids,
                delta,
            ))
        });

        match outcome {
            AccrualOutcome::CountedOnly => {
                self.store.request_save();
                Ok(None)
            }
            AccrualOutcome::Awarded(level_up) => {
                self.activity.stamp_message(event.guild_id, event.user_id);
                self.store.request_save();
                Ok(level_up)
            }
        }
    }

    /// Process one completed voice session. Voice awards are not
    /// cooldown-gated; sessions are naturally spaced by join/leave events.
    pub fn handle_voice_session(
        &self,
        event: &VoiceEvent,
    ) -> Result<Option<LevelUpEvent>, LevelingError> {
        Self::validate_ids(event.user_id, event.guild_id)?;

        let outcome = self.store.with_guild_mut(event.guild_id, |config| {
            // Counters are unconditional; only the XP award is gated.
            config.profile_mut(event.user_id).voice_seconds += event.elapsed_secs;
            if config.weekly.enabled {
                config.weekly_profile_mut(event.user_id).voice_seconds += event.elapsed_secs;
            }

            if !voice_eligible(event, config) {
                return AccrualOutcome::CountedOnly;
            }

            let delta = voice_delta(event, config, &mut rand::thread_rng());
            AccrualOutcome::Awarded(Self::apply_delta(
                config,
                event.guild_id,
                event.user_id,
                &event.role_ids,
                delta,
            ))
        });

        match outcome {
            AccrualOutcome::CountedOnly => {
                self.store.request_save();
                Ok(None)
            }
            AccrualOutcome::Awarded(level_up) => {
                self.store.request_save();
                Ok(level_up)
            }
        }
    }

    /// Add a delta to the profile, the weekly mirror, and every role-group
    /// aggregate the actor's roles hit; then recompute the level projection.
    /// Fires at most one level-up per call even when XP jumps several levels.
    fn apply_delta(
        config: &mut GuildConfig,
        guild_id: u64,
        user_id: u64,
        role_ids: &[u64],
        delta: f64,
    ) -> Option<LevelUpEvent> {
        let algorithm = config.algorithm;

        if config.weekly.enabled {
            config.weekly_profile_mut(user_id).xp += delta;
        }
        for role in role_ids {
            if let Some(aggregate) = config.role_groups.get_mut(role) {
                *aggregate += delta;
            }
        }

        let profile = config.profile_mut(user_id);
        profile.xp += delta;
        let total_xp = profile.xp;
        let old_level = profile.level;
        let new_level = algorithm.level_for_xp(total_xp);

        // The accrual path only ever raises the cached level. A computed
        // level below the stored one (possible after an XP removal) is left
        // alone; display reads heal it lazily.
        if new_level > old_level {
            profile.level = new_level;
            Some(LevelUpEvent {
                guild_id,
                user_id,
                old_level,
                new_level,
                total_xp,
            })
        } else {
            None
        }
    }

    // ------------------------------------------------------------------
    // Voice session bookkeeping (delegated to the ephemeral cache)
    // ------------------------------------------------------------------

    pub fn open_voice_session(
        &self,
        guild_id: u64,
        user_id: u64,
        self_mute: bool,
        self_deaf: bool,
    ) {
        self.activity
            .open_voice(guild_id, user_id, self_mute, self_deaf);
    }

    pub fn update_voice_flags(
        &self,
        guild_id: u64,
        user_id: u64,
        self_mute: bool,
        self_deaf: bool,
    ) {
        self.activity
            .update_voice_flags(guild_id, user_id, self_mute, self_deaf);
    }

    pub fn close_voice_session(&self, guild_id: u64, user_id: u64) -> Option<VoiceSession> {
        self.activity.close_voice(guild_id, user_id)
    }

    // ------------------------------------------------------------------
    // Stars
    // ------------------------------------------------------------------

    /// Peer star award via reaction. Returns `false` when denied (self-award,
    /// giver on cooldown, giver ignored, or leveling disabled).
    pub fn award_star(
        &self,
        guild_id: u64,
        giver_id: u64,
        recipient_id: u64,
    ) -> Result<bool, LevelingError> {
        Self::validate_ids(giver_id, guild_id)?;
        Self::validate_ids(recipient_id, guild_id)?;
        if giver_id == recipient_id {
            return Ok(false);
        }

        let since = self.activity.since_last_star(guild_id, giver_id);
        let awarded = self.store.with_guild_mut(guild_id, |config| {
            if !config.enabled || config.ignored_users.contains(&giver_id) {
                return false;
            }
            if let Some(elapsed) = since {
                if elapsed.as_secs() < config.star_cooldown_secs {
                    return false;
                }
            }
            config.profile_mut(recipient_id).stars += 1;
            if config.weekly.enabled {
                config.weekly_profile_mut(recipient_id).stars += 1;
            }
            true
        });

        if awarded {
            self.activity.stamp_star(guild_id, giver_id);
            self.store.request_save();
        }
        Ok(awarded)
    }

    // ------------------------------------------------------------------
    // Admin XP operations
    // ------------------------------------------------------------------

    /// Grant a flat amount to a user's permanent profile, with the same
    /// level-up detection as organic accrual (no weekly or role-group
    /// credit).
    pub fn add_xp(
        &self,
        guild_id: u64,
        user_id: u64,
        amount: f64,
    ) -> Result<Option<LevelUpEvent>, LevelingError> {
        Self::validate_ids(user_id, guild_id)?;
        let level_up = self.store.with_guild_mut(guild_id, |config| {
            let algorithm = config.algorithm;
            let profile = config.profile_mut(user_id);
            profile.xp += amount.max(0.0);
            let total_xp = profile.xp;
            let old_level = profile.level;
            let new_level = algorithm.level_for_xp(total_xp);
            if new_level > old_level {
                profile.level = new_level;
                Some(LevelUpEvent {
                    guild_id,
                    user_id,
                    old_level,
                    new_level,
                    total_xp,
                })
            } else {
                None
            }
        });
        self.store.request_save();
        Ok(level_up)
    }

    /// Subtract XP, flooring at zero. The cached level is deliberately NOT
    /// lowered here; there is no level-down event. Returns the new total.
    pub fn remove_xp(
        &self,
        guild_id: u64,
        user_id: u64,
        amount: f64,
    ) -> Result<f64, LevelingError> {
        Self::validate_ids(user_id, guild_id)?;
        let new_xp = self.store.with_guild_mut(guild_id, |config| {
            let profile = config.profile_mut(user_id);
            profile.xp = (profile.xp - amount.max(0.0)).max(0.0);
            profile.xp
        });
        self.store.request_save();
        Ok(new_xp)
    }

    /// Set a user's level directly by writing the corresponding
    /// `xp_required(level)` into the profile. Returns the new XP total.
    pub fn set_level(&self, guild_id: u64, user_id: u64, level: u32) -> Result<f64, LevelingError> {
        Self::validate_ids(user_id, guild_id)?;
        let new_xp = self.store.with_guild_mut(guild_id, |config| {
            let xp = config.algorithm.xp_required(level);
            let profile = config.profile_mut(user_id);
            profile.xp = xp;
            profile.level = level;
            xp
        });
        self.store.request_save();
        Ok(new_xp)
    }

    /// Take the next prestige rank: requires the configured level and a
    /// defined next tier, then resets XP and level to zero. Returns the new
    /// prestige number.
    pub fn prestige(&self, guild_id: u64, user_id: u64) -> Result<u32, LevelingError> {
        Self::validate_ids(user_id, guild_id)?;
        let result = self.store.with_guild_mut(guild_id, |config| {
            let required = config.prestige_required_level;
            if required == 0 {
                return Err(LevelingError::PrestigeDisabled);
            }
            let (level, prestige) = config
                .profiles
                .get(&user_id)
                .map(|p| (p.level, p.prestige))
                .ok_or(LevelingError::NoProfile { guild_id, user_id })?;
            if level < required {
                return Err(LevelingError::PrestigeTooLow {
                    have: level,
                    need: required,
                });
            }
            let next = prestige + 1;
            if !config.prestige_tiers.contains_key(&next) {
                return Err(LevelingError::NoNextTier(prestige));
            }
            let profile = config.profile_mut(user_id);
            profile.prestige = next;
            profile.xp = 0.0;
            profile.level = 0;
            Ok(next)
        });
        if result.is_ok() {
            self.store.request_save();
        }
        result
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn profile_view(&self, guild_id: u64, user_id: u64) -> Result<ProfileView, LevelingError> {
        Self::validate_ids(user_id, guild_id)?;
        let (view, healed) = self.store.with_guild_mut(guild_id, |config| {
            let algorithm = config.algorithm;
            let Some(profile) = config.profiles.get(&user_id).cloned() else {
                return (None, false);
            };
            let badge = config
                .prestige_tiers
                .get(&profile.prestige)
                .map(|tier| tier.badge.clone());

            // Self-healing read: lift a stale cached level up to the
            // XP-derived one. Never lowered here either.
            let true_level = algorithm.level_for_xp(profile.xp);
            let healed = true_level > profile.level;
            let level = profile.level.max(true_level);
            if healed {
                config.profile_mut(user_id).level = level;
            }

            let view = ProfileView {
                user_id,
                xp: profile.xp,
                level,
                prestige: profile.prestige,
                prestige_badge: badge,
                messages: profile.messages,
                voice_seconds: profile.voice_seconds,
                stars: profile.stars,
                level_floor_xp: algorithm.xp_required(level),
                next_level_xp: algorithm.xp_required(level + 1),
            };
            (Some(view), healed)
        });
        if healed {
            self.store.request_save();
        }
        view.ok_or(LevelingError::NoProfile { guild_id, user_id })
    }

    pub fn leaderboard(&self, guild_id: u64, limit: usize) -> Vec<LeaderboardEntry> {
        let mut entries = self.store.with_guild(guild_id, |config| {
            config
                .profiles
                .iter()
                .map(|(user, profile)| LeaderboardEntry {
                    user_id: *user,
                    xp: profile.xp,
                    // Same projection as profile reads: the cached level is
                    // never shown lower than the XP-derived one, and an XP
                    // removal does not lower it either.
                    level: profile.level.max(config.algorithm.level_for_xp(profile.xp)),
                })
                .collect::<Vec<_>>()
        });
        entries.sort_by(|a, b| b.xp.partial_cmp(&a.xp).unwrap_or(std::cmp::Ordering::Equal));
        entries.truncate(limit);
        entries
    }

    pub fn weekly_leaderboard(&self, guild_id: u64, limit: usize) -> Vec<LeaderboardEntry> {
        let mut entries = self.store.with_guild(guild_id, |config| {
            config
                .weekly_profiles
                .iter()
                .filter(|(_, weekly)| weekly.xp > 0.0)
                .map(|(user, weekly)| LeaderboardEntry {
                    user_id: *user,
                    xp: weekly.xp,
                    level: config
                        .profiles
                        .get(user)
                        .map(|p| p.level)
                        .unwrap_or_default(),
                })
                .collect::<Vec<_>>()
        });
        entries.sort_by(|a, b| b.xp.partial_cmp(&a.xp).unwrap_or(std::cmp::Ordering::Equal));
        entries.truncate(limit);
        entries
    }

    pub fn notify_settings(&self, guild_id: u64) -> NotifySettings {
        self.store.with_guild(guild_id, |config| NotifySettings {
            channel_id: config.notify_channel,
            dm: config.notify_dm,
            mention: config.notify_mention,
            template: config.levelup_message.clone(),
        })
    }

    // ------------------------------------------------------------------
    // Role synchronization
    // ------------------------------------------------------------------

    /// Plan the add/remove role set for one member. Unknown members plan
    /// against an empty profile (level 0, prestige 0).
    pub fn plan_member_roles(
        &self,
        guild_id: u64,
        user_id: u64,
        held_roles: HashSet<u64>,
    ) -> RolePlan {
        self.store.with_guild(guild_id, |config| {
            let (level, prestige) = config
                .profiles
                .get(&user_id)
                .map(|p| (p.level, p.prestige))
                .unwrap_or_default();
            let view = MemberRoleView {
                user_id,
                level,
                prestige,
                held_roles,
            };
            plan_roles(&view, config)
        })
    }

    /// Self-healing: drop level-role mappings whose role no longer exists or
    /// cannot be assigned. Returns how many entries were pruned.
    pub fn prune_level_roles(&self, guild_id: u64, bad_role_ids: &[u64]) -> usize {
        if bad_role_ids.is_empty() {
            return 0;
        }
        let pruned = self.store.with_guild_mut(guild_id, |config| {
            let before = config.level_roles.len();
            config
                .level_roles
                .retain(|_, role| !bad_role_ids.contains(role));
            before - config.level_roles.len()
        });
        if pruned > 0 {
            self.store.request_save();
        }
        pruned
    }

    // ------------------------------------------------------------------
    // Weekly rotation
    // ------------------------------------------------------------------

    pub fn weekly_due(&self, guild_id: u64, now: DateTime<Utc>) -> bool {
        self.store
            .with_guild(guild_id, |config| should_fire(now, &config.weekly))
    }

    /// Run a weekly rotation. Returns `None` when there is nothing to reset
    /// (no present member with positive weekly XP) - in that case no state
    /// is touched, so an accidental trigger on an empty week is a no-op.
    pub fn reset_weekly(
        &self,
        guild_id: u64,
        present_members: &HashSet<u64>,
        now: DateTime<Utc>,
    ) -> Result<Option<WeeklyResetOutcome>, LevelingError> {
        if guild_id == 0 {
            return Err(LevelingError::InvalidId);
        }
        let outcome = self.store.with_guild_mut(guild_id, |config| {
            let winners = rank_weekly(config, present_members);
            if winners.is_empty() {
                return None;
            }

            let algorithm = config.algorithm;
            let bonus = config.weekly.bonus_xp as f64;
            let mut level_ups = Vec::new();
            if bonus > 0.0 {
                for winner in &winners {
                    let profile = config.profile_mut(winner.user_id);
                    let old_level = profile.level;
                    profile.xp += bonus;
                    let total_xp = profile.xp;
                    let new_level = algorithm.level_for_xp(total_xp);
                    if new_level > old_level {
                        profile.level = new_level;
                        level_ups.push(LevelUpEvent {
                            guild_id,
                            user_id: winner.user_id,
                            old_level,
                            new_level,
                            total_xp,
                        });
                    }
                }
            }

            config.weekly.last_winners = winners.iter().map(|w| w.user_id).collect();
            config.weekly_profiles.clear();
            config.weekly.last_reset = Some(now);
            config.weekly.next_reset = Some(next_reset_after(now, &config.weekly));

            Some(WeeklyResetOutcome {
                guild_id,
                winners,
                channel_id: config.weekly.channel_id,
                role_id: config.weekly.role_id,
                role_all_winners: config.weekly.role_all_winners,
                ping_winners: config.weekly.ping_winners,
                level_ups,
            })
        });
        if outcome.is_some() {
            self.store.request_save();
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    pub fn guild_ids(&self) -> Vec<u64> {
        self.store.guild_ids()
    }

    pub async fn flush(&self) -> Result<(), LevelingError> {
        Ok(self.store.flush().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::leveling::models::{BonusRange, PrestigeTier};
    use crate::infra::leveling::InMemoryGuildStore;

    fn service_with(
        configure: impl FnOnce(&mut GuildConfig),
    ) -> (LevelingService<InMemoryGuildStore>, InMemoryGuildStore) {
        let store = InMemoryGuildStore::default();
        store.with_guild_mut(1, |config| configure(config));
        (LevelingService::new(store.clone()), store)
    }

    fn message() -> MessageEvent {
        MessageEvent {
            guild_id: 1,
            user_id: 2,
            channel_id: 10,
            category_id: None,
            content_len: 10,
            role_ids: vec![],
        }
    }

    #[test]
    fn first_message_awards_in_range_without_level_up() {
        let (service, store) = service_with(|_| {});
        let level_up = service.handle_message(&message()).unwrap();
        assert!(level_up.is_none());

        store.with_guild(1, |config| {
            let profile = config.profiles.get(&2).unwrap();
            assert!((3.0..=6.0).contains(&profile.xp), "xp {}", profile.xp);
            assert_eq!(profile.messages, 1);
            assert_eq!(profile.level, 0);
        });
    }

    #[test]
    fn cooldown_blocks_xp_but_not_counters() {
        let (service, store) = service_with(|_| {});
        service.handle_message(&message()).unwrap();
        let xp_after_first = store.with_guild(1, |c| c.profiles.get(&2).unwrap().xp);

        // Immediate second message: counted, not awarded.
        service.handle_message(&message()).unwrap();
        store.with_guild(1, |config| {
            let profile = config.profiles.get(&2).unwrap();
            assert_eq!(profile.messages, 2);
            assert_eq!(profile.xp, xp_after_first);
        });
    }

    #[test]
    fn ineligible_channel_still_counts_the_message() {
        let (service, store) = service_with(|config| {
            config.ignored_channels.insert(10);
        });
        service.handle_message(&message()).unwrap();
        store.with_guild(1, |config| {
            let profile = config.profiles.get(&2).unwrap();
            assert_eq!(profile.messages, 1);
            assert_eq!(profile.xp, 0.0);
        });
    }

    #[test]
    fn disabled_guild_counts_activity_but_awards_nothing() {
        let (service, store) = service_with(|config| {
            config.enabled = false;
        });
        service.handle_message(&message()).unwrap();
        let event = VoiceEvent {
            guild_id: 1,
            user_id: 2,
            channel_id: 30,
            category_id: None,
            elapsed_secs: 120.0,
            role_ids: vec![],
            self_mute: false,
            self_deaf: false,
            invisible: false,
            alone: false,
        };
        service.handle_voice_session(&event).unwrap();

        store.with_guild(1, |config| {
            let profile = config.profiles.get(&2).unwrap();
            assert_eq!(profile.messages, 1);
            assert_eq!(profile.voice_seconds, 120.0);
            assert_eq!(profile.xp, 0.0);
            assert_eq!(profile.level, 0);
        });
    }

    #[test]
    fn crossing_the_threshold_fires_exactly_one_level_up() {
        let (service, _store) = service_with(|config| {
            config.xp_range = BonusRange(6, 6);
        });
        service.add_xp(1, 2, 95.0).unwrap();

        let level_up = service.handle_message(&message()).unwrap().unwrap();
        assert_eq!(level_up.old_level, 0);
        assert_eq!(level_up.new_level, 1);
        assert_eq!(level_up.total_xp, 101.0);
    }

    #[test]
    fn multi_level_jump_fires_once_with_the_final_level() {
        let (service, _store) = service_with(|_| {});
        let level_up = service.add_xp(1, 2, 1000.0).unwrap().unwrap();
        assert_eq!(level_up.old_level, 0);
        assert_eq!(level_up.new_level, 3); // floor(sqrt(10)) = 3
    }

    #[test]
    fn voice_session_accrues_per_minute_and_tracks_time() {
        let (service, store) = service_with(|config| {
            config.voice_xp_per_minute = 2.0;
        });
        let event = VoiceEvent {
            guild_id: 1,
            user_id: 2,
            channel_id: 30,
            category_id: None,
            elapsed_secs: 300.0,
            role_ids: vec![],
            self_mute: false,
            self_deaf: false,
            invisible: false,
            alone: false,
        };
        service.handle_voice_session(&event).unwrap();
        store.with_guild(1, |config| {
            let profile = config.profiles.get(&2).unwrap();
            assert_eq!(profile.voice_seconds, 300.0);
            assert_eq!(profile.xp, 10.0);
        });
    }

    #[test]
    fn muted_session_counts_time_but_earns_nothing() {
        let (service, store) = service_with(|config| {
            config.ignore_muted = true;
        });
        let event = VoiceEvent {
            guild_id: 1,
            user_id: 2,
            channel_id: 30,
            category_id: None,
            elapsed_secs: 120.0,
            role_ids: vec![],
            self_mute: true,
            self_deaf: false,
            invisible: false,
            alone: false,
        };
        service.handle_voice_session(&event).unwrap();
        store.with_guild(1, |config| {
            let profile = config.profiles.get(&2).unwrap();
            assert_eq!(profile.voice_seconds, 120.0);
            assert_eq!(profile.xp, 0.0);
        });
    }

    #[test]
    fn role_group_aggregates_collect_deltas() {
        let (service, store) = service_with(|config| {
            config.xp_range = BonusRange(5, 5);
            config.role_groups.insert(100, 0.0);
        });
        let event = MessageEvent {
            role_ids: vec![100],
            ..message()
        };
        service.handle_message(&event).unwrap();
        store.with_guild(1, |config| {
            assert_eq!(*config.role_groups.get(&100).unwrap(), 5.0);
        });
    }

    #[test]
    fn weekly_mirror_tracks_when_enabled() {
        let (service, store) = service_with(|config| {
            config.weekly.enabled = true;
            config.xp_range = BonusRange(4, 4);
        });
        service.handle_message(&message()).unwrap();
        store.with_guild(1, |config| {
            let weekly = config.weekly_profiles.get(&2).unwrap();
            assert_eq!(weekly.xp, 4.0);
            assert_eq!(weekly.messages, 1);
        });
    }

    #[test]
    fn remove_xp_floors_at_zero_and_keeps_the_level() {
        let (service, store) = service_with(|_| {});
        service.set_level(1, 2, 3).unwrap();
        let new_xp = service.remove_xp(1, 2, 1_000_000.0).unwrap();
        assert_eq!(new_xp, 0.0);
        store.with_guild(1, |config| {
            // No level-down: the cached level survives the removal.
            assert_eq!(config.profiles.get(&2).unwrap().level, 3);
        });
    }

    #[test]
    fn set_level_writes_the_required_xp() {
        let (service, store) = service_with(|_| {});
        let xp = service.set_level(1, 2, 5).unwrap();
        assert_eq!(xp, 2500.0);
        store.with_guild(1, |config| {
            let profile = config.profiles.get(&2).unwrap();
            assert_eq!(profile.level, 5);
            assert_eq!(profile.xp, 2500.0);
        });
    }

    #[test]
    fn profile_view_heals_a_stale_level() {
        let (service, store) = service_with(|_| {});
        store.with_guild_mut(1, |config| {
            let profile = config.profile_mut(2);
            profile.xp = 2500.0;
            profile.level = 1; // stale
        });
        let view = service.profile_view(1, 2).unwrap();
        assert_eq!(view.level, 5);
        store.with_guild(1, |config| {
            assert_eq!(config.profiles.get(&2).unwrap().level, 5);
        });
    }

    #[test]
    fn prestige_requires_config_level_and_next_tier() {
        let (service, store) = service_with(|config| {
            config.prestige_required_level = 10;
            config.prestige_tiers.insert(
                1,
                PrestigeTier {
                    role_id: 900,
                    badge: "I".to_string(),
                },
            );
        });

        assert!(matches!(
            service.prestige(1, 2),
            Err(LevelingError::NoProfile { .. })
        ));

        service.set_level(1, 2, 4).unwrap();
        assert!(matches!(
            service.prestige(1, 2),
            Err(LevelingError::PrestigeTooLow { have: 4, need: 10 })
        ));

        service.set_level(1, 2, 10).unwrap();
        assert_eq!(service.prestige(1, 2).unwrap(), 1);
        store.with_guild(1, |config| {
            let profile = config.profiles.get(&2).unwrap();
            assert_eq!(profile.prestige, 1);
            assert_eq!(profile.xp, 0.0);
            assert_eq!(profile.level, 0);
        });

        // No tier 2 configured.
        service.set_level(1, 2, 10).unwrap();
        assert!(matches!(
            service.prestige(1, 2),
            Err(LevelingError::NoNextTier(1))
        ));
    }

    #[test]
    fn star_awards_respect_cooldown_and_self_award() {
        let (service, store) = service_with(|_| {});
        assert!(!service.award_star(1, 2, 2).unwrap());
        assert!(service.award_star(1, 2, 3).unwrap());
        // Giver immediately tries again: denied.
        assert!(!service.award_star(1, 2, 4).unwrap());
        store.with_guild(1, |config| {
            assert_eq!(config.profiles.get(&3).unwrap().stars, 1);
            assert!(config.profiles.get(&4).is_none());
        });
    }

    #[test]
    fn empty_weekly_reset_is_a_no_op() {
        let (service, store) = service_with(|config| {
            config.weekly.enabled = true;
            config.weekly.last_winners = vec![42];
        });
        let present: HashSet<u64> = [2, 3].into_iter().collect();
        let outcome = service.reset_weekly(1, &present, Utc::now()).unwrap();
        assert!(outcome.is_none());
        store.with_guild(1, |config| {
            assert_eq!(config.weekly.last_winners, vec![42]);
            assert!(config.weekly.last_reset.is_none());
            assert!(config.weekly.next_reset.is_none());
        });
    }

    #[test]
    fn weekly_reset_ranks_rewards_and_clears() {
        let (service, store) = service_with(|config| {
            config.weekly.enabled = true;
            config.weekly.winner_count = 2;
            config.weekly.bonus_xp = 400;
        });
        store.with_guild_mut(1, |config| {
            config.weekly_profile_mut(2).xp = 50.0;
            config.weekly_profile_mut(3).xp = 90.0;
            config.weekly_profile_mut(4).xp = 10.0;
        });

        let present: HashSet<u64> = [2, 3, 4].into_iter().collect();
        let now = Utc::now();
        let outcome = service.reset_weekly(1, &present, now).unwrap().unwrap();

        assert_eq!(
            outcome
                .winners
                .iter()
                .map(|w| w.user_id)
                .collect::<Vec<_>>(),
            vec![3, 2]
        );
        // 400 bonus XP lifts both fresh profiles to level 2.
        assert_eq!(outcome.level_ups.len(), 2);

        store.with_guild(1, |config| {
            assert!(config.weekly_profiles.is_empty());
            assert_eq!(config.weekly.last_winners, vec![3, 2]);
            assert_eq!(config.weekly.last_reset, Some(now));
            assert!(config.weekly.next_reset.unwrap() > now);
            assert_eq!(config.profiles.get(&3).unwrap().xp, 400.0);
        });
    }

    #[test]
    fn leaderboard_and_profile_agree_on_levels_after_an_xp_removal() {
        let (service, _store) = service_with(|_| {});
        service.set_level(1, 2, 5).unwrap();
        service.remove_xp(1, 2, 2000.0).unwrap();

        let view = service.profile_view(1, 2).unwrap();
        let entry = service
            .leaderboard(1, 10)
            .into_iter()
            .find(|e| e.user_id == 2)
            .unwrap();
        assert_eq!(view.level, 5);
        assert_eq!(entry.level, view.level);
    }

    #[test]
    fn prune_level_roles_drops_only_bad_ids() {
        let (service, store) = service_with(|config| {
            config.level_roles.insert(5, 100);
            config.level_roles.insert(10, 200);
        });
        assert_eq!(service.prune_level_roles(1, &[200, 999]), 1);
        store.with_guild(1, |config| {
            assert_eq!(config.level_roles.len(), 1);
            assert_eq!(config.level_roles.get(&5), Some(&100));
        });
    }

    #[test]
    fn zero_ids_are_rejected() {
        let (service, _store) = service_with(|_| {});
        assert!(matches!(
            service.add_xp(0, 2, 1.0),
            Err(LevelingError::InvalidId)
        ));
        assert!(matches!(
            service.add_xp(1, 0, 1.0),
            Err(LevelingError::InvalidId)
        ));
    }
}
