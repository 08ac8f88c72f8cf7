// In-memory implementation of GuildStore, used by the core unit tests.
// Cloning shares the underlying map, so a test can keep a handle to inspect
// state after moving a clone into the service.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core::leveling::{GuildConfig, GuildStore, StoreError};

#[derive(Clone, Default)]
pub struct InMemoryGuildStore {
    guilds: Arc<DashMap<u64, GuildConfig>>,
    save_requests: Arc<AtomicUsize>,
}

impl InMemoryGuildStore {
    /// How many times a save was requested (for asserting persistence hooks).
    pub fn save_requests(&self) -> usize {
        self.save_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GuildStore for InMemoryGuildStore {
    fn with_guild<R>(&self, guild_id: u64, f: impl FnOnce(&GuildConfig) -> R) -> R {
        match self.guilds.get(&guild_id) {
            Some(entry) => f(entry.value()),
            None => f(&GuildConfig::default()),
        }
    }

    fn with_guild_mut<R>(&self, guild_id: u64, f: impl FnOnce(&mut GuildConfig) -> R) -> R {
        let mut entry = self.guilds.entry(guild_id).or_default();
        f(entry.value_mut())
    }

    fn guild_ids(&self) -> Vec<u64> {
        self.guilds.iter().map(|entry| *entry.key()).collect()
    }

    fn request_save(&self) {
        self.save_requests.fetch_add(1, Ordering::SeqCst);
    }

    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_state() {
        let store = InMemoryGuildStore::default();
        let handle = store.clone();
        store.with_guild_mut(1, |config| config.profile_mut(2).xp = 10.0);
        handle.with_guild(1, |config| {
            assert_eq!(config.profiles.get(&2).unwrap().xp, 10.0);
        });
        store.request_save();
        assert_eq!(handle.save_requests(), 1);
    }
}
