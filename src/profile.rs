//! Applicant profiles.
//!
//! Each profile is a distinct applicant identity competing to receive routed
//! messages: keyword affinities, a CV attachment, and an email template.
//! Profiles are loaded once per run and immutable during it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pipeline::templates::{self, Template};

fn default_threshold() -> f64 {
    0.7
}

fn default_margin() -> f64 {
    0.1
}

/// One applicant profile definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub display_name: String,
    pub applicant_name: String,
    pub keywords_positive: Vec<String>,
    pub keywords_negative: Vec<String>,
    /// Minimum routing score for this profile to be a candidate.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Minimum winner-vs-runner-up margin before routing is a tie.
    #[serde(default = "default_margin")]
    pub ambiguity_margin: f64,
    /// Path to the CV attachment (must exist and be a PDF at send time).
    pub cv_path: PathBuf,
    pub template: Template,
}

/// Load and validate profiles from a JSON file.
///
/// Validation failures are fatal configuration errors: an empty profile
/// list, duplicate ids, or a template missing the mandatory source-link
/// placeholder all abort the run before any message is processed.
pub fn load_profiles(path: &Path) -> Result<Vec<Profile>, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let profiles: Vec<Profile> = serde_json::from_str(&raw)?;
    validate_profiles(&profiles, path)?;
    Ok(profiles)
}

/// Validate an already-constructed profile set.
pub fn validate_profiles(profiles: &[Profile], path: &Path) -> Result<(), ConfigError> {
    if profiles.is_empty() {
        return Err(ConfigError::NoProfiles(path.to_path_buf()));
    }
    for (i, profile) in profiles.iter().enumerate() {
        if profiles[..i].iter().any(|p| p.id == profile.id) {
            return Err(ConfigError::DuplicateProfileId(profile.id.clone()));
        }
        if !profile.template.body.contains(templates::SOURCE_LINK_PLACEHOLDER) {
            return Err(ConfigError::MissingPlaceholder {
                profile_id: profile.id.clone(),
                placeholder: templates::SOURCE_LINK_PLACEHOLDER,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_profile(id: &str, positive: &[&str], negative: &[&str]) -> Profile {
    Profile {
        id: id.to_string(),
        display_name: format!("Profile {id}"),
        applicant_name: "Alex Doe".to_string(),
        keywords_positive: positive.iter().map(|s| s.to_string()).collect(),
        keywords_negative: negative.iter().map(|s| s.to_string()).collect(),
        threshold: 0.7,
        ambiguity_margin: 0.1,
        cv_path: PathBuf::from("/tmp/cv.pdf"),
        template: Template {
            subject: "Application: {{JOB_TITLE}}".to_string(),
            body: "Hi,\n\nI am {{APPLICANT_NAME}}, applying for {{JOB_TITLE}}.\nSeen here: {{SOURCE_LINK}}\n"
                .to_string(),
        },
    }
}
