// The leveling engine. Everything here works with primitive ids and plain
// structs so it can be tested without a gateway connection.

pub mod accrual;
pub mod activity;
pub mod algorithm;
pub mod eligibility;
pub mod leveling_service;
pub mod models;
pub mod roles;
pub mod store;
pub mod weekly;

pub use algorithm::LevelAlgorithm;
pub use leveling_service::{
    LeaderboardEntry, LevelingError, LevelingService, NotifySettings, ProfileView,
};
pub use models::{GuildConfig, LevelUpEvent, MessageEvent, VoiceEvent};
pub use roles::RolePlan;
pub use store::{GuildStore, StoreError};
pub use weekly::WeeklyResetOutcome;
