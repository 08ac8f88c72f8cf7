// Discord layer - commands and event handlers.

#[path = "commands/command_catalog.rs"]
pub mod commands;

#[path = "leveling/announcements.rs"]
pub mod announcements;

#[path = "leveling/role_sync.rs"]
pub mod role_sync;

#[path = "leveling/voice_sessions.rs"]
pub mod voice_sessions;

#[path = "leveling/weekly_task.rs"]
pub mod weekly_task;

// Re-export command types for convenience
pub use commands::leveling::{Data, Error};
