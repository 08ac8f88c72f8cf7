// Domain models for the leveling system.
//
// Everything here is plain data: primitive ids (u64), counters, and
// configuration. No Discord types leak into this layer, so the engine can be
// exercised from unit tests without a gateway connection.

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::algorithm::LevelAlgorithm;

/// An inclusive `[min, max]` XP roll range.
///
/// Used for the base per-message award and for every channel/role bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusRange(pub u32, pub u32);

impl BonusRange {
    pub fn min(&self) -> u32 {
        self.0.min(self.1)
    }

    pub fn max(&self) -> u32 {
        self.0.max(self.1)
    }
}

impl Default for BonusRange {
    fn default() -> Self {
        BonusRange(3, 6)
    }
}

/// A user's permanent record in one guild.
///
/// `level` is a cached projection of `xp` - the accrual path only ever raises
/// it, and display paths recompute it lazily when it falls behind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub xp: f64,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub prestige: u32,
    #[serde(default)]
    pub messages: u64,
    #[serde(default)]
    pub voice_seconds: f64,
    /// Peer-awarded star count (reaction based).
    #[serde(default)]
    pub stars: u64,
}

/// The weekly mirror of [`Profile`]. Wholly cleared on each weekly rotation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeeklyProfile {
    #[serde(default)]
    pub xp: f64,
    #[serde(default)]
    pub messages: u64,
    #[serde(default)]
    pub voice_seconds: f64,
    #[serde(default)]
    pub stars: u64,
}

/// One prestige rank: the level required to take it, the role awarded for
/// holding it, and a badge shown on profiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrestigeTier {
    pub role_id: u64,
    #[serde(default)]
    pub badge: String,
}

fn default_weekly_reset_hour() -> u8 {
    0
}

fn default_winner_count() -> usize {
    1
}

/// Weekly leaderboard settings and rotation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklySettings {
    #[serde(default)]
    pub enabled: bool,
    /// Day the week rolls over (serialized as 0-6, Monday = 0).
    #[serde(default = "default_reset_day", with = "weekday_number")]
    pub reset_day: Weekday,
    #[serde(default = "default_weekly_reset_hour")]
    pub reset_hour: u8,
    #[serde(default = "default_winner_count")]
    pub winner_count: usize,
    /// Channel the winner announcement goes to.
    #[serde(default)]
    pub channel_id: Option<u64>,
    /// Role handed to the winner(s) until the next rotation.
    #[serde(default)]
    pub role_id: Option<u64>,
    /// Whether the winner role goes to every ranked winner or only the top one.
    #[serde(default)]
    pub role_all_winners: bool,
    #[serde(default)]
    pub ping_winners: bool,
    /// Flat XP granted to each winner's permanent profile.
    #[serde(default)]
    pub bonus_xp: u64,
    /// Ranked ids from the last rotation, index 0 = first place. Kept so the
    /// winner role can be pulled again on the next rotation.
    #[serde(default)]
    pub last_winners: Vec<u64>,
    #[serde(default)]
    pub last_reset: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_reset: Option<DateTime<Utc>>,
}

fn default_reset_day() -> Weekday {
    Weekday::Sun
}

impl Default for WeeklySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            reset_day: default_reset_day(),
            reset_hour: default_weekly_reset_hour(),
            winner_count: default_winner_count(),
            channel_id: None,
            role_id: None,
            role_all_winners: false,
            ping_winners: false,
            bonus_xp: 0,
            last_winners: Vec::new(),
            last_reset: None,
            next_reset: None,
        }
    }
}

/// Serialize `chrono::Weekday` as its Monday-based number so the state file
/// stays readable and stable across chrono versions.
mod weekday_number {
    use chrono::Weekday;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(day: &Weekday, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_u8(day.num_days_from_monday() as u8)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Weekday, D::Error> {
        let n = u8::deserialize(de)?;
        match n {
            0 => Ok(Weekday::Mon),
            1 => Ok(Weekday::Tue),
            2 => Ok(Weekday::Wed),
            3 => Ok(Weekday::Thu),
            4 => Ok(Weekday::Fri),
            5 => Ok(Weekday::Sat),
            6 => Ok(Weekday::Sun),
            _ => Err(serde::de::Error::custom("weekday must be 0-6")),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_cooldown() -> u64 {
    60
}

fn default_star_cooldown() -> u64 {
    3600
}

fn default_voice_rate() -> f64 {
    2.0
}

fn default_levelup_message() -> String {
    "{user} reached level {level}!".to_string()
}

/// Per-guild configuration plus the profile maps it owns.
///
/// Serialized as one entry in the single persisted JSON document. Missing
/// fields take defaults so an older state file still loads; a structurally
/// invalid file is rejected at startup instead of being coerced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildConfig {
    /// Guild-wide leveling toggle. When off no XP is awarded; activity
    /// counters still accrue.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Base XP roll per eligible message.
    #[serde(default)]
    pub xp_range: BonusRange,
    /// Voice XP per minute of tracked session time.
    #[serde(default = "default_voice_rate")]
    pub voice_xp_per_minute: f64,
    /// Seconds that must pass between two message awards for one user.
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    /// Seconds between star awards from one giver.
    #[serde(default = "default_star_cooldown")]
    pub star_cooldown_secs: u64,
    /// Messages shorter than this earn nothing (0 disables the check).
    #[serde(default)]
    pub min_message_length: usize,

    #[serde(default)]
    pub ignored_channels: HashSet<u64>,
    #[serde(default)]
    pub ignored_roles: HashSet<u64>,
    #[serde(default)]
    pub ignored_users: HashSet<u64>,
    /// When non-empty, the channel, its category, or one of the author's
    /// roles must appear here for a message to earn XP.
    #[serde(default)]
    pub allow_list: HashSet<u64>,

    /// Bonus roll per channel or category id, message path.
    #[serde(default)]
    pub channel_bonuses_msg: HashMap<u64, BonusRange>,
    /// Bonus roll per channel or category id, voice path (flat per session).
    #[serde(default)]
    pub channel_bonuses_voice: HashMap<u64, BonusRange>,
    /// Bonus roll per role id, message path. All held roles stack.
    #[serde(default)]
    pub role_bonuses_msg: HashMap<u64, BonusRange>,
    /// Bonus roll per role id, voice path (flat per session).
    #[serde(default)]
    pub role_bonuses_voice: HashMap<u64, BonusRange>,

    /// Level -> role id. BTreeMap keeps the keys unique and ordered.
    #[serde(default)]
    pub level_roles: BTreeMap<u32, u64>,
    /// Remove lower level roles when a higher one is earned.
    #[serde(default)]
    pub autoremove: bool,

    /// Prestige number -> tier. 0 is never a key (prestige starts at 1).
    #[serde(default)]
    pub prestige_tiers: BTreeMap<u32, PrestigeTier>,
    /// Level required to prestige. 0 disables prestige entirely.
    #[serde(default)]
    pub prestige_required_level: u32,
    /// Keep every earned prestige role rather than only the current tier.
    #[serde(default = "default_enabled")]
    pub stack_prestige_roles: bool,
    /// Once prestiged, every configured level role counts as earned.
    #[serde(default)]
    pub keep_level_roles_on_prestige: bool,

    /// Voice eligibility gates.
    #[serde(default)]
    pub ignore_deafened: bool,
    #[serde(default)]
    pub ignore_muted: bool,
    #[serde(default)]
    pub ignore_invisible: bool,
    /// Skip voice XP when the member is alone in the channel.
    #[serde(default)]
    pub ignore_solo: bool,

    /// Guild-level XP aggregates keyed by role id. Every accrued delta is
    /// also added here for each tracked role the actor holds.
    #[serde(default)]
    pub role_groups: HashMap<u64, f64>,

    #[serde(default)]
    pub algorithm: LevelAlgorithm,
    #[serde(default)]
    pub weekly: WeeklySettings,

    /// Level-up notification settings.
    #[serde(default)]
    pub notify_channel: Option<u64>,
    #[serde(default)]
    pub notify_dm: bool,
    #[serde(default)]
    pub notify_mention: bool,
    #[serde(default = "default_levelup_message")]
    pub levelup_message: String,

    #[serde(default)]
    pub profiles: HashMap<u64, Profile>,
    #[serde(default)]
    pub weekly_profiles: HashMap<u64, WeeklyProfile>,
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            xp_range: BonusRange::default(),
            voice_xp_per_minute: default_voice_rate(),
            cooldown_secs: default_cooldown(),
            star_cooldown_secs: default_star_cooldown(),
            min_message_length: 0,
            ignored_channels: HashSet::new(),
            ignored_roles: HashSet::new(),
            ignored_users: HashSet::new(),
            allow_list: HashSet::new(),
            channel_bonuses_msg: HashMap::new(),
            channel_bonuses_voice: HashMap::new(),
            role_bonuses_msg: HashMap::new(),
            role_bonuses_voice: HashMap::new(),
            level_roles: BTreeMap::new(),
            autoremove: false,
            prestige_tiers: BTreeMap::new(),
            prestige_required_level: 0,
            stack_prestige_roles: true,
            keep_level_roles_on_prestige: false,
            ignore_deafened: false,
            ignore_muted: false,
            ignore_invisible: false,
            ignore_solo: false,
            role_groups: HashMap::new(),
            algorithm: LevelAlgorithm::default(),
            weekly: WeeklySettings::default(),
            notify_channel: None,
            notify_dm: false,
            notify_mention: false,
            levelup_message: default_levelup_message(),
            profiles: HashMap::new(),
            weekly_profiles: HashMap::new(),
        }
    }
}

impl GuildConfig {
    pub fn profile_mut(&mut self, user_id: u64) -> &mut Profile {
        self.profiles.entry(user_id).or_default()
    }

    pub fn weekly_profile_mut(&mut self, user_id: u64) -> &mut WeeklyProfile {
        self.weekly_profiles.entry(user_id).or_default()
    }
}

/// A message-sent gateway event, reduced to what the engine needs.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub guild_id: u64,
    pub user_id: u64,
    pub channel_id: u64,
    pub category_id: Option<u64>,
    pub content_len: usize,
    pub role_ids: Vec<u64>,
}

/// A completed voice session, reported when the member leaves or moves.
#[derive(Debug, Clone)]
pub struct VoiceEvent {
    pub guild_id: u64,
    pub user_id: u64,
    pub channel_id: u64,
    pub category_id: Option<u64>,
    pub elapsed_secs: f64,
    pub role_ids: Vec<u64>,
    pub self_mute: bool,
    pub self_deaf: bool,
    pub invisible: bool,
    /// No other non-bot member shared the channel.
    pub alone: bool,
}

/// Fired when an accrual step pushes a profile past a level threshold.
/// Returned by the service so the Discord layer can announce it and sync
/// roles; fires at most once per accrual even when XP jumps several levels.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelUpEvent {
    pub guild_id: u64,
    pub user_id: u64,
    pub old_level: u32,
    pub new_level: u32,
    pub total_xp: f64,
}
