//! Relevance classification — keyword rule table and classifier.

pub mod classifier;
pub mod rules;

pub use classifier::{ClassificationResult, Guardrail, RelevanceClassifier};
pub use rules::{GroupRole, KeywordGroup, KeywordMatch, KeywordRuleTable, Lang};
