// src/rl/reinforcement.rs
//! Per-(user, strain) reinforcement tally, embedded in the user profile.
//!
//! The score is a monotonic net count of positive vs negative signals:
//! unbounded in both directions, no clamping, no decay.

use crate::models::profile::{FeedbackSign, UserProfile};

/// Current tally for a strain. Defaults to 0.0 for strains that never
/// received feedback; never fails.
pub fn get_score(profile: &UserProfile, strain_name: &str) -> f64 {
    profile
        .reinforcement
        .get(strain_name)
        .copied()
        .unwrap_or(0.0)
}

/// Applies one signed feedback event to the in-memory profile and returns
/// the new score, rounded to two decimals.
///
/// Callers that persist the profile must serialize the load-adjust-store
/// cycle per user; `FeedbackProcessor::adjust_reinforcement` does that.
pub fn adjust_score(profile: &mut UserProfile, strain_name: &str, sign: FeedbackSign) -> f64 {
    let current = get_score(profile, strain_name);
    let updated = round2(current + sign.delta());
    profile
        .reinforcement
        .insert(strain_name.to_string(), updated);
    updated
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_score_is_zero() {
        let profile = UserProfile::new("user@example.com");
        assert_eq!(get_score(&profile, "Blue Dream"), 0.0);
    }

    #[test]
    fn test_positive_positive_negative_sequence() {
        let mut profile = UserProfile::new("user@example.com");

        assert_eq!(
            adjust_score(&mut profile, "Blue Dream", FeedbackSign::Positive),
            1.0
        );
        assert_eq!(
            adjust_score(&mut profile, "Blue Dream", FeedbackSign::Positive),
            2.0
        );
        assert_eq!(
            adjust_score(&mut profile, "Blue Dream", FeedbackSign::Negative),
            1.0
        );

        assert_eq!(get_score(&profile, "Blue Dream"), 1.0);
        assert_eq!(get_score(&profile, "OG Kush"), 0.0);
    }

    #[test]
    fn test_score_is_unbounded() {
        let mut profile = UserProfile::new("user@example.com");
        for _ in 0..25 {
            adjust_score(&mut profile, "Blue Dream", FeedbackSign::Negative);
        }
        assert_eq!(get_score(&profile, "Blue Dream"), -25.0);
    }

    #[test]
    fn test_updates_are_isolated_per_strain() {
        let mut profile = UserProfile::new("user@example.com");
        adjust_score(&mut profile, "Blue Dream", FeedbackSign::Positive);
        adjust_score(&mut profile, "OG Kush", FeedbackSign::Negative);
        adjust_score(&mut profile, "Blue Dream", FeedbackSign::Positive);

        assert_eq!(get_score(&profile, "Blue Dream"), 2.0);
        assert_eq!(get_score(&profile, "OG Kush"), -1.0);
    }
}
