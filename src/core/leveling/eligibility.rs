// The eligibility gate: decides whether an event may earn XP at all,
// independent of how much it would earn.
//
// Both predicates are pure. The caller records the new cooldown timestamp
// only after a successful accrual, never on mere eligibility.

use std::time::Duration;

use super::models::{GuildConfig, MessageEvent, VoiceEvent};

/// Ordered short-circuit checks for a message event. `since_last_award` is
/// the time elapsed since this user's last awarded message in this guild;
/// `None` means the first ever message, which is always past the cooldown.
pub fn message_eligible(
    event: &MessageEvent,
    config: &GuildConfig,
    since_last_award: Option<Duration>,
) -> bool {
    if !config.enabled {
        return false;
    }
    if config.ignored_users.contains(&event.user_id) {
        return false;
    }
    if config.ignored_channels.contains(&event.channel_id) {
        return false;
    }
    if let Some(category) = event.category_id {
        if config.ignored_channels.contains(&category) {
            return false;
        }
    }
    if !config.allow_list.is_empty() && !allow_list_passes(event, config) {
        return false;
    }
    if event.content_len < config.min_message_length {
        return false;
    }
    if event
        .role_ids
        .iter()
        .any(|role| config.ignored_roles.contains(role))
    {
        return false;
    }
    match since_last_award {
        None => true,
        Some(elapsed) => elapsed > Duration::from_secs(config.cooldown_secs),
    }
}

/// The allow list may name the channel, its category, or any of the
/// author's roles; one hit is enough.
fn allow_list_passes(event: &MessageEvent, config: &GuildConfig) -> bool {
    if config.allow_list.contains(&event.channel_id) {
        return true;
    }
    if let Some(category) = event.category_id {
        if config.allow_list.contains(&category) {
            return true;
        }
    }
    event
        .role_ids
        .iter()
        .any(|role| config.allow_list.contains(role))
}

/// Eligibility for a completed voice session. Voice awards are not
/// cooldown-gated; sessions are naturally spaced by join/leave events.
pub fn voice_eligible(event: &VoiceEvent, config: &GuildConfig) -> bool {
    if !config.enabled {
        return false;
    }
    if config.ignored_users.contains(&event.user_id) {
        return false;
    }
    if config.ignored_channels.contains(&event.channel_id) {
        return false;
    }
    if let Some(category) = event.category_id {
        if config.ignored_channels.contains(&category) {
            return false;
        }
    }
    if config.ignore_deafened && event.self_deaf {
        return false;
    }
    if config.ignore_muted && event.self_mute {
        return false;
    }
    if config.ignore_invisible && event.invisible {
        return false;
    }
    if config.ignore_solo && event.alone {
        return false;
    }
    !event
        .role_ids
        .iter()
        .any(|role| config.ignored_roles.contains(role))
}
