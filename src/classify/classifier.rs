//! Relevance classifier — deterministic keyword-weighted scoring with
//! cross-category guardrails.
//!
//! Classification is a pure function of (text, rule table version):
//! identical inputs always yield identical scores, verdicts, and evidence.

use serde::Serialize;
use tracing::debug;

use crate::classify::rules::{GroupRole, KeywordMatch, KeywordRuleTable};

/// Default relevance threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Which guardrail zeroed the score, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Guardrail {
    /// Conditional-only match (e.g. "remote") with no core signal.
    ConditionalWithoutCore,
    /// Negative match without sufficient core weight, or a negative phrase
    /// swallowing the sole positive keyword ("restaurant server").
    NegativeContext,
}

/// Result of classifying one message.
///
/// The matched-keyword evidence is mandatory — it is the only way to audit
/// false positives/negatives later.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationResult {
    pub score: f64,
    pub relevant: bool,
    pub matches: Vec<KeywordMatch>,
    pub guardrail: Option<Guardrail>,
    pub reasons: Vec<String>,
    pub table_version: String,
}

/// Keyword-weighted relevance classifier.
pub struct RelevanceClassifier {
    table: KeywordRuleTable,
    threshold: f64,
}

impl RelevanceClassifier {
    pub fn new(table: KeywordRuleTable) -> Self {
        Self {
            table,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn table(&self) -> &KeywordRuleTable {
        &self.table
    }

    /// Classify message text.
    ///
    /// Score accumulates `group.weight` per unique matched keyword, then
    /// guardrails apply in fixed order:
    /// 1. conditional matches with no core match anywhere → score 0;
    /// 2. negative matches without sufficient core weight → score 0.
    pub fn classify(&self, text: &str) -> ClassificationResult {
        let matches = self.table.match_text(text);

        let mut score = 0.0;
        let mut core_weight = 0.0;
        let mut has_conditional = false;
        let mut has_negative = false;
        let mut positive_keywords: Vec<&str> = Vec::new();

        for m in &matches {
            match m.role {
                GroupRole::Core => {
                    score += m.weight;
                    core_weight += m.weight;
                    positive_keywords.push(&m.keyword);
                }
                GroupRole::Conditional => {
                    score += m.weight;
                    has_conditional = true;
                    positive_keywords.push(&m.keyword);
                }
                GroupRole::Negative => {
                    has_negative = true;
                }
            }
        }

        let mut guardrail = None;

        // Guardrail 1: conditional-only signals never make a message relevant.
        if has_conditional && core_weight == 0.0 {
            score = 0.0;
            guardrail = Some(Guardrail::ConditionalWithoutCore);
        }

        // Guardrail 2: negative matches zero the score unless core signals
        // carry enough weight on their own.
        if guardrail.is_none() && has_negative && core_weight < self.threshold {
            score = 0.0;
            guardrail = Some(Guardrail::NegativeContext);
        }

        // A multi-word negative phrase that contains the sole matched
        // positive keyword ("restaurant server" vs "server") is negative
        // context, not a tech signal.
        if guardrail.is_none() && has_negative && positive_keywords.len() <= 1 {
            let negative_phrases = matches
                .iter()
                .filter(|m| m.role == GroupRole::Negative && m.keyword.contains(' '));
            for phrase in negative_phrases {
                let phrase_lower = phrase.keyword.to_lowercase();
                if positive_keywords
                    .iter()
                    .any(|k| phrase_lower.contains(&k.to_lowercase()))
                {
                    score = 0.0;
                    guardrail = Some(Guardrail::NegativeContext);
                    break;
                }
            }
        }

        let relevant = score >= self.threshold;

        let mut reasons = Vec::new();
        for m in &matches {
            if m.role == GroupRole::Negative {
                continue;
            }
            if m.role == GroupRole::Conditional && core_weight == 0.0 {
                continue;
            }
            if let Some(label) = self.table.label_for(&m.group) {
                if !reasons.iter().any(|r| r == label) {
                    reasons.push(label.to_string());
                }
            }
        }

        debug!(
            score,
            relevant,
            matches = matches.len(),
            guardrail = ?guardrail,
            "Classified message"
        );

        ClassificationResult {
            score,
            relevant,
            matches,
            guardrail,
            reasons,
            table_version: self.table.version().to_string(),
        }
    }
}
