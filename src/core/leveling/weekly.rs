// Weekly leaderboard rotation: ranking, trigger timing, and the outcome
// handed to the Discord layer for announcement and winner-role handling.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use std::collections::HashSet;

use super::models::{GuildConfig, LevelUpEvent, WeeklySettings};

/// How long after the scheduled minute a reset may still fire. The scheduler
/// ticks once a minute, so a few minutes of slack covers missed ticks.
pub const TOLERANCE: Duration = Duration::minutes(15);

/// Minimum gap between two automatic resets, so one scheduled hour never
/// fires twice.
pub const MIN_RESET_GAP: Duration = Duration::hours(1);

/// One ranked weekly winner.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyWinner {
    pub user_id: u64,
    pub xp: f64,
}

/// Everything the Discord layer needs to announce a completed rotation.
#[derive(Debug, Clone)]
pub struct WeeklyResetOutcome {
    pub guild_id: u64,
    pub winners: Vec<WeeklyWinner>,
    pub channel_id: Option<u64>,
    pub role_id: Option<u64>,
    pub role_all_winners: bool,
    pub ping_winners: bool,
    /// Level-ups caused by the winner bonus XP.
    pub level_ups: Vec<LevelUpEvent>,
}

/// Rank weekly profiles with positive XP, restricted to members still in the
/// guild, descending, truncated to the configured winner count.
pub fn rank_weekly(config: &GuildConfig, present_members: &HashSet<u64>) -> Vec<WeeklyWinner> {
    let mut ranked: Vec<WeeklyWinner> = config
        .weekly_profiles
        .iter()
        .filter(|(user, weekly)| weekly.xp > 0.0 && present_members.contains(user))
        .map(|(user, weekly)| WeeklyWinner {
            user_id: *user,
            xp: weekly.xp,
        })
        .collect();
    ranked.sort_by(|a, b| b.xp.partial_cmp(&a.xp).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(config.weekly.winner_count.max(1));
    ranked
}

/// Whether the scheduler should fire a reset at `now`. Pure so the timing
/// rules are testable without a clock.
pub fn should_fire(now: DateTime<Utc>, settings: &WeeklySettings) -> bool {
    if !settings.enabled {
        return false;
    }
    if now.weekday() != settings.reset_day || now.hour() != settings.reset_hour as u32 {
        return false;
    }
    if i64::from(now.minute()) >= TOLERANCE.num_minutes() {
        return false;
    }
    match settings.last_reset {
        None => true,
        Some(last) => now - last >= MIN_RESET_GAP,
    }
}

/// The next scheduled reset instant strictly after `now`.
pub fn next_reset_after(now: DateTime<Utc>, settings: &WeeklySettings) -> DateTime<Utc> {
    let days_ahead = (settings.reset_day.num_days_from_monday() + 7
        - now.weekday().num_days_from_monday())
        % 7;
    let candidate = (now + Duration::days(i64::from(days_ahead)))
        .with_hour(u32::from(settings.reset_hour))
        .and_then(|t| t.with_minute(0))
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    if candidate > now {
        candidate
    } else {
        candidate + Duration::days(7)
    }
}
