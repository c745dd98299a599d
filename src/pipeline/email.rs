//! Contact-address extraction with ambiguity handling.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::error::ConfigError;
use crate::pipeline::types::{EmailResolution, SkipReason};

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
            .expect("email pattern compiles")
    })
}

/// Extract all email addresses from text, case-insensitively deduplicated,
/// order preserved.
pub fn extract_emails(text: &str) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut emails = Vec::new();
    for m in email_regex().find_iter(text) {
        let lower = m.as_str().to_lowercase();
        if !seen.contains(&lower) {
            seen.push(lower);
            emails.push(m.as_str().to_string());
        }
    }
    emails
}

/// Resolve extracted candidates to at most one address.
///
/// - zero candidates → skip `no_email_found`;
/// - exactly one → selected automatically;
/// - two or more → skip `multiple_emails_ambiguous`, unless an explicit
///   zero-based override index was supplied at run configuration time.
///
/// An out-of-range override index is a configuration error, fatal for the
/// whole run — not a per-message skip.
pub fn resolve(
    candidates: Vec<String>,
    override_index: Option<usize>,
) -> Result<EmailResolution, ConfigError> {
    let resolution = match candidates.len() {
        0 => EmailResolution {
            candidates,
            selected: None,
            skip: Some(SkipReason::NoEmailFound),
        },
        1 => EmailResolution {
            candidates,
            selected: Some(0),
            skip: None,
        },
        n => match override_index {
            Some(index) if index >= n => {
                return Err(ConfigError::EmailIndexOutOfRange { index, max: n - 1 });
            }
            Some(index) => EmailResolution {
                candidates,
                selected: Some(index),
                skip: None,
            },
            None => EmailResolution {
                candidates,
                selected: None,
                skip: Some(SkipReason::MultipleEmailsAmbiguous),
            },
        },
    };

    debug!(
        candidates = resolution.candidates.len(),
        selected = ?resolution.selected,
        skip = ?resolution.skip,
        "Resolved email candidates"
    );
    Ok(resolution)
}
