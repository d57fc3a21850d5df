// src/ranking/mod.rs
use log::debug;

use crate::models::profile::UserProfile;
use crate::models::strain::{RankedCandidate, RetrievedCandidate};
use crate::rl::reinforcement;
use crate::utils::constants::{AROMA_MATCH_WEIGHT, EFFECT_MATCH_WEIGHT};

/// Fuses retrieval distance order, profile preference overlap, and the
/// per-user reinforcement tally into one ranking.
///
/// Pure function of (candidates, profile): no side effects, no randomness.
/// The sort is stable and descending by adjusted score, so ties keep their
/// original retrieval order.
pub fn rank(candidates: &[RetrievedCandidate], profile: &UserProfile) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = candidates
        .iter()
        .map(|candidate| {
            let adjusted_score = adjusted_score(candidate, profile);
            RankedCandidate {
                strain: candidate.strain.clone(),
                distance: candidate.distance,
                adjusted_score,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.adjusted_score
            .partial_cmp(&a.adjusted_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    debug!(
        "Ranked {} candidates for '{}' (top score: {:.2})",
        ranked.len(),
        profile.email,
        ranked.first().map(|c| c.adjusted_score).unwrap_or(0.0)
    );
    ranked
}

/// Preference boost plus reinforcement for a single candidate.
///
/// Tag matching is case-insensitive substring containment against the
/// strain's description text. A strain with no text still receives its
/// reinforcement term.
fn adjusted_score(candidate: &RetrievedCandidate, profile: &UserProfile) -> f64 {
    let content = candidate.strain.content.to_lowercase();

    let effect_hits = profile
        .desired_effects
        .iter()
        .filter(|effect| content.contains(&effect.to_lowercase()))
        .count() as f64;
    let aroma_hits = profile
        .preferred_aromas
        .iter()
        .filter(|aroma| content.contains(&aroma.to_lowercase()))
        .count() as f64;

    effect_hits * EFFECT_MATCH_WEIGHT
        + aroma_hits * AROMA_MATCH_WEIGHT
        + reinforcement::get_score(profile, &candidate.strain.name)
}
