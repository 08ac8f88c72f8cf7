// Storage port for the guild configuration aggregate.
//
// The core defines WHAT it needs; the infra layer provides the actual
// implementation (JSON state file in production, in-memory for tests).

use async_trait::async_trait;
use thiserror::Error;

use super::models::GuildConfig;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("background write task failed: {0}")]
    TaskFailed(String),
}

/// Closure-based access to per-guild state.
///
/// Handlers mutate the in-memory aggregate in place and then call
/// `request_save`; persistence is debounced and coalesced in the background,
/// accepting eventual consistency between memory and disk.
#[async_trait]
pub trait GuildStore: Send + Sync + 'static {
    /// Read access. Missing guilds are observed as the default configuration.
    fn with_guild<R>(&self, guild_id: u64, f: impl FnOnce(&GuildConfig) -> R) -> R;

    /// Mutable access; creates the guild entry on first use.
    fn with_guild_mut<R>(&self, guild_id: u64, f: impl FnOnce(&mut GuildConfig) -> R) -> R;

    fn guild_ids(&self) -> Vec<u64>;

    /// Ask the background writer to persist soon. Never blocks.
    fn request_save(&self);

    /// Write the current state out immediately (shutdown path).
    async fn flush(&self) -> Result<(), StoreError>;
}
