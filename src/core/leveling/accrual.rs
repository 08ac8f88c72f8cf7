// XP delta computation for eligible events.
//
// Rolls are uniform integers over inclusive ranges. The channel bonus takes
// precedence over the category bonus (never both); role bonuses stack
// additively with no precedence among roles.

use rand::Rng;

use super::models::{BonusRange, GuildConfig, MessageEvent, VoiceEvent};

fn roll(range: &BonusRange, rng: &mut impl Rng) -> u32 {
    rng.gen_range(range.min()..=range.max())
}

/// XP delta for a message: base roll + channel-or-category bonus roll + one
/// roll per matching role bonus.
pub fn message_delta(event: &MessageEvent, config: &GuildConfig, rng: &mut impl Rng) -> f64 {
    let mut delta = roll(&config.xp_range, rng) as f64;

    if let Some(bonus) = channel_bonus(
        &config.channel_bonuses_msg,
        event.channel_id,
        event.category_id,
    ) {
        delta += roll(bonus, rng) as f64;
    }

    for role in &event.role_ids {
        if let Some(bonus) = config.role_bonuses_msg.get(role) {
            delta += roll(bonus, rng) as f64;
        }
    }

    delta
}

/// XP delta for a completed voice session: per-minute base rate, plus flat
/// channel and role bonuses. The bonuses are intentionally NOT scaled by
/// session length; that matches the long-standing observed behavior even
/// though the base rate is per-minute.
pub fn voice_delta(event: &VoiceEvent, config: &GuildConfig, rng: &mut impl Rng) -> f64 {
    let mut delta = config.voice_xp_per_minute * (event.elapsed_secs / 60.0);

    if let Some(bonus) = channel_bonus(
        &config.channel_bonuses_voice,
        event.channel_id,
        event.category_id,
    ) {
        delta += roll(bonus, rng) as f64;
    }

    for role in &event.role_ids {
        if let Some(bonus) = config.role_bonuses_voice.get(role) {
            delta += roll(bonus, rng) as f64;
        }
    }

    delta
}

fn channel_bonus<'a>(
    bonuses: &'a std::collections::HashMap<u64, BonusRange>,
    channel_id: u64,
    category_id: Option<u64>,
) -> Option<&'a BonusRange> {
    bonuses
        .get(&channel_id)
        .or_else(|| category_id.and_then(|cat| bonuses.get(&cat)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn message_event() -> MessageEvent {
        MessageEvent {
            guild_id: 1,
            user_id: 2,
            channel_id: 10,
            category_id: Some(20),
            content_len: 10,
            role_ids: vec![100, 101],
        }
    }

    #[test]
    fn base_roll_stays_in_range() {
        let config = GuildConfig {
            xp_range: BonusRange(3, 6),
            ..Default::default()
        };
        let mut rng = rng();
        for _ in 0..200 {
            let delta = message_delta(&message_event(), &config, &mut rng);
            assert!((3.0..=6.0).contains(&delta), "delta {delta} out of range");
        }
    }

    #[test]
    fn channel_bonus_beats_category_bonus() {
        let mut config = GuildConfig {
            xp_range: BonusRange(1, 1),
            ..Default::default()
        };
        config.channel_bonuses_msg.insert(10, BonusRange(100, 100));
        config.channel_bonuses_msg.insert(20, BonusRange(500, 500));

        let delta = message_delta(&message_event(), &config, &mut rng());
        // Channel (100) applies, category (500) does not; never both.
        assert_eq!(delta, 101.0);
    }

    #[test]
    fn category_bonus_applies_when_channel_has_none() {
        let mut config = GuildConfig {
            xp_range: BonusRange(1, 1),
            ..Default::default()
        };
        config.channel_bonuses_msg.insert(20, BonusRange(500, 500));

        let delta = message_delta(&message_event(), &config, &mut rng());
        assert_eq!(delta, 501.0);
    }

    #[test]
    fn role_bonuses_stack_additively() {
        let mut config = GuildConfig {
            xp_range: BonusRange(1, 1),
            ..Default::default()
        };
        config.role_bonuses_msg.insert(100, BonusRange(10, 10));
        config.role_bonuses_msg.insert(101, BonusRange(25, 25));
        config.role_bonuses_msg.insert(999, BonusRange(1000, 1000));

        let delta = message_delta(&message_event(), &config, &mut rng());
        // Both held role bonuses apply; the unheld one does not.
        assert_eq!(delta, 36.0);
    }

    #[test]
    fn voice_base_scales_per_minute_but_bonuses_are_flat() {
        let mut config = GuildConfig {
            voice_xp_per_minute: 2.0,
            ..Default::default()
        };
        config.channel_bonuses_voice.insert(30, BonusRange(5, 5));
        config.role_bonuses_voice.insert(100, BonusRange(3, 3));

        let event = VoiceEvent {
            guild_id: 1,
            user_id: 2,
            channel_id: 30,
            category_id: None,
            elapsed_secs: 600.0,
            role_ids: vec![100],
            self_mute: false,
            self_deaf: false,
            invisible: false,
            alone: false,
        };

        // 10 minutes at 2/min = 20, plus flat 5 + 3.
        assert_eq!(voice_delta(&event, &config, &mut rng()), 28.0);

        let short = VoiceEvent {
            elapsed_secs: 60.0,
            ..event
        };
        // Bonuses do not shrink with the session either.
        assert_eq!(voice_delta(&short, &config, &mut rng()), 10.0);
    }

    #[test]
    fn fractional_voice_rates_accumulate() {
        let config = GuildConfig {
            voice_xp_per_minute: 0.5,
            ..Default::default()
        };
        let event = VoiceEvent {
            guild_id: 1,
            user_id: 2,
            channel_id: 30,
            category_id: None,
            elapsed_secs: 90.0,
            role_ids: vec![],
            self_mute: false,
            self_deaf: false,
            invisible: false,
            alone: false,
        };
        assert_eq!(voice_delta(&event, &config, &mut rng()), 0.75);
    }
}
