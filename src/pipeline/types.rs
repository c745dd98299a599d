//! Shared decision types for the dispatch pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Why a message was skipped instead of dispatched.
///
/// This is a closed enumeration — no ad hoc reasons. Routing decisions use
/// only `NoMatch`/`AmbiguousBothMatch`/`TieClose`; `NotRelevant` marks the
/// classifier exit stage and exists only on audit entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotRelevant,
    NoMatch,
    AmbiguousBothMatch,
    TieClose,
    NoEmailFound,
    MultipleEmailsAmbiguous,
    Duplicate,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRelevant => "not_relevant",
            Self::NoMatch => "no_match",
            Self::AmbiguousBothMatch => "ambiguous_both_match",
            Self::TieClose => "tie_close",
            Self::NoEmailFound => "no_email_found",
            Self::MultipleEmailsAmbiguous => "multiple_emails_ambiguous",
            Self::Duplicate => "duplicate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_relevant" => Some(Self::NotRelevant),
            "no_match" => Some(Self::NoMatch),
            "ambiguous_both_match" => Some(Self::AmbiguousBothMatch),
            "tie_close" => Some(Self::TieClose),
            "no_email_found" => Some(Self::NoEmailFound),
            "multiple_emails_ambiguous" => Some(Self::MultipleEmailsAmbiguous),
            "duplicate" => Some(Self::Duplicate),
            _ => None,
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of routing one relevance-positive message across all profiles.
///
/// Exactly one of `profile_id`/`skip` is set.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub message_id: i64,
    pub profile_id: Option<String>,
    pub skip: Option<SkipReason>,
    /// Per-profile score breakdown, in profile declaration order.
    pub scores: Vec<(String, f64)>,
}

/// Outcome of contact-address extraction for one message.
#[derive(Debug, Clone, Serialize)]
pub struct EmailResolution {
    pub candidates: Vec<String>,
    pub selected: Option<usize>,
    pub skip: Option<SkipReason>,
}

impl EmailResolution {
    pub fn selected_email(&self) -> Option<&str> {
        self.selected
            .and_then(|i| self.candidates.get(i))
            .map(String::as_str)
    }
}

/// Per-run processing statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub processed: u64,
    pub relevant: u64,
    pub drafted: u64,
    pub sent: u64,
    pub skipped: u64,
    pub failed: u64,
    pub by_skip_reason: BTreeMap<String, u64>,
}

impl RunStats {
    pub fn record_skip(&mut self, reason: SkipReason) {
        self.skipped += 1;
        *self
            .by_skip_reason
            .entry(reason.as_str().to_string())
            .or_insert(0) += 1;
    }
}
