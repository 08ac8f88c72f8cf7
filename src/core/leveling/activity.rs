// Process-scoped ephemeral state: cooldown stamps and open voice sessions.
//
// Contract: this cache is lossy on restart. It is seeded from the current
// voice presence at startup and never persisted; the worst case after a
// crash is one reset cooldown or one lost voice session per user. Races
// between two concurrent events for the same user are accepted (at most one
// extra award, self-correcting on the next cooldown check).

use dashmap::DashMap;
use std::time::{Duration, Instant};

type Key = (u64, u64); // (guild_id, user_id)

/// An open voice session. The flags are captured at join and refreshed on
/// voice state updates so eligibility sees the session's final state.
#[derive(Debug, Clone, Copy)]
pub struct VoiceSession {
    pub joined_at: Instant,
    pub self_mute: bool,
    pub self_deaf: bool,
}

#[derive(Debug, Default)]
pub struct ActivityCache {
    last_message: DashMap<Key, Instant>,
    last_star: DashMap<Key, Instant>,
    voice_sessions: DashMap<Key, VoiceSession>,
}

impl ActivityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time since the user's last awarded message, `None` for the first one.
    pub fn since_last_message(&self, guild_id: u64, user_id: u64) -> Option<Duration> {
        self.last_message
            .get(&(guild_id, user_id))
            .map(|stamp| stamp.elapsed())
    }

    /// Recorded only after a successful accrual, not on mere eligibility.
    pub fn stamp_message(&self, guild_id: u64, user_id: u64) {
        self.last_message.insert((guild_id, user_id), Instant::now());
    }

    pub fn since_last_star(&self, guild_id: u64, user_id: u64) -> Option<Duration> {
        self.last_star
            .get(&(guild_id, user_id))
            .map(|stamp| stamp.elapsed())
    }

    pub fn stamp_star(&self, guild_id: u64, user_id: u64) {
        self.last_star.insert((guild_id, user_id), Instant::now());
    }

    /// Open a voice session, replacing any stale one for the same user.
    pub fn open_voice(&self, guild_id: u64, user_id: u64, self_mute: bool, self_deaf: bool) {
        self.voice_sessions.insert(
            (guild_id, user_id),
            VoiceSession {
                joined_at: Instant::now(),
                self_mute,
                self_deaf,
            },
        );
    }

    /// Refresh the mute/deaf flags of an open session without restarting it.
    pub fn update_voice_flags(&self, guild_id: u64, user_id: u64, self_mute: bool, self_deaf: bool) {
        if let Some(mut session) = self.voice_sessions.get_mut(&(guild_id, user_id)) {
            session.self_mute = self_mute;
            session.self_deaf = self_deaf;
        }
    }

    /// Close and return the session, if one was open.
    pub fn close_voice(&self, guild_id: u64, user_id: u64) -> Option<VoiceSession> {
        self.voice_sessions
            .remove(&(guild_id, user_id))
            .map(|(_, session)| session)
    }

    pub fn open_voice_count(&self) -> usize {
        self.voice_sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_stamp_round_trip() {
        let cache = ActivityCache::new();
        assert!(cache.since_last_message(1, 2).is_none());
        cache.stamp_message(1, 2);
        let elapsed = cache.since_last_message(1, 2).unwrap();
        assert!(elapsed < Duration::from_secs(1));
        // Other users are unaffected.
        assert!(cache.since_last_message(1, 3).is_none());
    }

    #[test]
    fn voice_session_open_close() {
        let cache = ActivityCache::new();
        assert!(cache.close_voice(1, 2).is_none());

        cache.open_voice(1, 2, true, false);
        cache.update_voice_flags(1, 2, false, true);
        let session = cache.close_voice(1, 2).unwrap();
        assert!(!session.self_mute);
        assert!(session.self_deaf);
        // Closing is a take: gone afterwards.
        assert!(cache.close_voice(1, 2).is_none());
    }

    #[test]
    fn updating_flags_without_a_session_is_a_no_op() {
        let cache = ActivityCache::new();
        cache.update_voice_flags(1, 2, true, true);
        assert_eq!(cache.open_voice_count(), 0);
    }
}
