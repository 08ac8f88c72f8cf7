// JSON-backed guild store. The entire configuration store is one JSON
// document: { guild_id: GuildConfig }, loaded wholesale at startup and
// written atomically (temp file, fsync, rename) so a crash mid-write never
// leaves a partial state file behind.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::leveling::{GuildConfig, GuildStore, StoreError};

use super::saver::CoalescingSaver;

struct StoreInner {
    path: PathBuf,
    guilds: DashMap<u64, GuildConfig>,
    /// Serializes writers. The background saver and an explicit `flush` can
    /// run concurrently; both use the same temp file, so overlapping writes
    /// would splice two snapshots into one state file.
    write_lock: tokio::sync::Mutex<()>,
}

impl StoreInner {
    /// Serialize a point-in-time snapshot and swap it into place. BTreeMap
    /// keeps the guild keys ordered so the file diffs cleanly.
    async fn write_snapshot(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let snapshot: BTreeMap<u64, GuildConfig> = self
            .guilds
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        let json = serde_json::to_vec_pretty(&snapshot)?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let tmp = path.with_extension("json.tmp");
            let mut file = File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
            std::fs::rename(&tmp, &path)?;
            Ok(())
        })
        .await
        .map_err(|err| StoreError::TaskFailed(err.to_string()))?
    }
}

pub struct JsonGuildStore {
    inner: Arc<StoreInner>,
    saver: CoalescingSaver,
}

impl JsonGuildStore {
    /// Load the state file, or start empty when it does not exist yet.
    /// A malformed file is a hard error: refusing to start beats silently
    /// dropping everyone's XP.
    ///
    /// Must be called from within a tokio runtime (it spawns the background
    /// save worker).
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let guilds: DashMap<u64, GuildConfig> = if path.exists() {
            let file = File::open(&path)?;
            let reader = BufReader::new(file);
            let map: BTreeMap<u64, GuildConfig> = serde_json::from_reader(reader)?;
            map.into_iter().collect()
        } else {
            DashMap::new()
        };
        tracing::info!(guilds = guilds.len(), path = %path.display(), "state file loaded");

        let inner = Arc::new(StoreInner {
            path,
            guilds,
            write_lock: tokio::sync::Mutex::new(()),
        });
        let write_target = Arc::clone(&inner);
        let saver = CoalescingSaver::spawn(move || {
            let inner = Arc::clone(&write_target);
            async move { inner.write_snapshot().await }
        });

        Ok(Self { inner, saver })
    }
}

#[async_trait]
impl GuildStore for JsonGuildStore {
    fn with_guild<R>(&self, guild_id: u64, f: impl FnOnce(&GuildConfig) -> R) -> R {
        match self.inner.guilds.get(&guild_id) {
            Some(entry) => f(entry.value()),
            None => f(&GuildConfig::default()),
        }
    }

    fn with_guild_mut<R>(&self, guild_id: u64, f: impl FnOnce(&mut GuildConfig) -> R) -> R {
        let mut entry = self.inner.guilds.entry(guild_id).or_default();
        f(entry.value_mut())
    }

    fn guild_ids(&self) -> Vec<u64> {
        self.inner.guilds.iter().map(|entry| *entry.key()).collect()
    }

    fn request_save(&self) {
        self.saver.request();
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.inner.write_snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn state_survives_a_flush_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let store = JsonGuildStore::load(&path).unwrap();
        store.with_guild_mut(7, |config| {
            config.profile_mut(42).xp = 123.5;
            config.level_roles.insert(5, 999);
        });
        store.flush().await.unwrap();

        let reloaded = JsonGuildStore::load(&path).unwrap();
        reloaded.with_guild(7, |config| {
            assert_eq!(config.profiles.get(&42).unwrap().xp, 123.5);
            assert_eq!(config.level_roles.get(&5), Some(&999));
        });
        assert_eq!(reloaded.guild_ids(), vec![7]);
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonGuildStore::load(dir.path().join("state.json")).unwrap();
        assert!(store.guild_ids().is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_rejected_not_coerced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"{ not json").unwrap();

        assert!(matches!(
            JsonGuildStore::load(&path),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn flush_leaves_no_temp_file_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let store = JsonGuildStore::load(&path).unwrap();
        store.with_guild_mut(1, |_| {});
        store.flush().await.unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn flush_racing_the_background_save_keeps_the_file_parseable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let store = JsonGuildStore::load(&path).unwrap();

        // Enough state that a write takes a few syscalls.
        store.with_guild_mut(1, |config| {
            for user in 0..500u64 {
                config.profile_mut(user).xp = user as f64;
            }
        });

        // Kick the background saver and flush on top of it, repeatedly.
        for _ in 0..10 {
            store.request_save();
            let (first, second) = tokio::join!(store.flush(), store.flush());
            first.unwrap();
            second.unwrap();
        }
        store.flush().await.unwrap();

        let reloaded = JsonGuildStore::load(&path).unwrap();
        reloaded.with_guild(1, |config| {
            assert_eq!(config.profiles.len(), 500);
            assert_eq!(config.profiles.get(&499).unwrap().xp, 499.0);
        });
    }

    #[tokio::test]
    async fn missing_guild_reads_as_default() {
        let dir = TempDir::new().unwrap();
        let store = JsonGuildStore::load(dir.path().join("state.json")).unwrap();
        store.with_guild(1234, |config| {
            assert!(config.enabled);
            assert!(config.profiles.is_empty());
        });
        // Reading must not create the entry.
        assert!(store.guild_ids().is_empty());
    }
}
