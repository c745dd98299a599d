//! Profile router — deterministic keyword scoring with ambiguity detection.
//!
//! The router must never guess between two applicant identities: routing the
//! wrong profile misrepresents the sender. Every ambiguous situation is
//! resolved by skipping, with a distinct reason so audit data can tell a
//! clean double-match from a narrow single-winner race.

use tracing::debug;

use crate::classify::rules::keyword_regex;
use crate::pipeline::types::{RoutingDecision, SkipReason};
use crate::profile::Profile;

/// Weight applied per negative keyword match (stronger than positive to
/// suppress false positives).
const NEGATIVE_WEIGHT: f64 = 1.5;

/// Score a message against one profile.
///
/// +1.0 per positive keyword match, −1.5 per negative keyword match, using
/// the same whole-token matching discipline as the classifier.
pub fn score_profile(text: &str, profile: &Profile) -> f64 {
    let mut score = 0.0;
    for keyword in &profile.keywords_positive {
        if let Ok(re) = keyword_regex(keyword) {
            if re.is_match(text) {
                score += 1.0;
            }
        }
    }
    for keyword in &profile.keywords_negative {
        if let Ok(re) = keyword_regex(keyword) {
            if re.is_match(text) {
                score -= NEGATIVE_WEIGHT;
            }
        }
    }
    score
}

/// Route a relevance-positive message to exactly one profile, or skip.
///
/// Decision order (the both-match check deliberately precedes the margin
/// check — a clean double-match and a narrow race are distinct failure
/// modes):
/// 1. no profile reaches its threshold → `no_match`;
/// 2. two or more reach threshold → `ambiguous_both_match`;
/// 3. a sole candidate whose margin over the runner-up (even a runner-up
///    below threshold) is under its ambiguity margin → `tie_close`;
/// 4. otherwise route to the sole candidate.
pub fn route(message_id: i64, text: &str, profiles: &[Profile]) -> RoutingDecision {
    let scores: Vec<(String, f64)> = profiles
        .iter()
        .map(|p| (p.id.clone(), score_profile(text, p)))
        .collect();

    let candidates: Vec<usize> = profiles
        .iter()
        .enumerate()
        .filter(|(i, p)| scores[*i].1 >= p.threshold)
        .map(|(i, _)| i)
        .collect();

    let skip = |reason: SkipReason, scores: Vec<(String, f64)>| {
        debug!(message_id, reason = %reason, "Routing skipped");
        RoutingDecision {
            message_id,
            profile_id: None,
            skip: Some(reason),
            scores,
        }
    };

    if candidates.is_empty() {
        return skip(SkipReason::NoMatch, scores);
    }

    if candidates.len() >= 2 {
        return skip(SkipReason::AmbiguousBothMatch, scores);
    }

    let winner = candidates[0];
    let winner_score = scores[winner].1;
    let runner_up = scores
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != winner)
        .map(|(_, (_, s))| *s)
        .fold(f64::NEG_INFINITY, f64::max);

    if runner_up.is_finite() && (winner_score - runner_up).abs() < profiles[winner].ambiguity_margin
    {
        return skip(SkipReason::TieClose, scores);
    }

    debug!(
        message_id,
        profile = %profiles[winner].id,
        score = winner_score,
        "Routed to profile"
    );
    RoutingDecision {
        message_id,
        profile_id: Some(profiles[winner].id.clone()),
        skip: None,
        scores,
    }
}
