//! Email template rendering and job-title extraction.
//!
//! Every application must carry provenance: the template's source-link
//! placeholder is mandatory, and an entry may only be marked sent after the
//! rendered body has been validated to contain the message's permalink.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The mandatory provenance placeholder.
pub const SOURCE_LINK_PLACEHOLDER: &str = "{{SOURCE_LINK}}";
pub const JOB_TITLE_PLACEHOLDER: &str = "{{JOB_TITLE}}";
pub const APPLICANT_NAME_PLACEHOLDER: &str = "{{APPLICANT_NAME}}";

/// Maximum job-title length kept in subjects and audit records.
const TITLE_MAX_LEN: usize = 80;

/// An application email template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub subject: String,
    pub body: String,
}

/// A rendered subject/body pair.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub subject: String,
    pub body: String,
}

/// Substitute all placeholders in a template.
pub fn render(
    template: &Template,
    job_title: &str,
    source_link: &str,
    applicant_name: &str,
) -> Rendered {
    let fill = |s: &str| {
        s.replace(JOB_TITLE_PLACEHOLDER, job_title)
            .replace(SOURCE_LINK_PLACEHOLDER, source_link)
            .replace(APPLICANT_NAME_PLACEHOLDER, applicant_name)
    };
    Rendered {
        subject: fill(&template.subject),
        body: fill(&template.body),
    }
}

/// Validate a rendered email before it may be marked sendable.
///
/// The source-link placeholder must be gone and the permalink present.
/// Failure is a fatal configuration error, not a skip: an application
/// lacking provenance is a transparency violation.
pub fn validate_rendered(
    rendered: &Rendered,
    permalink: &str,
    message_id: i64,
) -> Result<(), ConfigError> {
    if permalink.is_empty() {
        return Err(ConfigError::MissingProvenance { message_id });
    }
    if rendered.body.contains(SOURCE_LINK_PLACEHOLDER)
        || rendered.subject.contains(SOURCE_LINK_PLACEHOLDER)
    {
        return Err(ConfigError::UnrenderedPlaceholder {
            placeholder: SOURCE_LINK_PLACEHOLDER,
        });
    }
    if !rendered.body.contains(permalink) {
        return Err(ConfigError::MissingProvenance { message_id });
    }
    Ok(())
}

fn title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:job\s+)?(?:title|position|role|job):\s*(.+)")
            .expect("title pattern compiles")
    })
}

/// Extract a job title from message text.
///
/// Looks for `Title:`/`Position:`/`Role:`/`Job:` markers in the first few
/// lines, falls back to the first line if it is a plausible length, then to
/// a generic placeholder.
pub fn extract_job_title(text: &str) -> String {
    let text = text.trim();
    let lines: Vec<&str> = text.lines().collect();

    for line in lines.iter().take(5) {
        if let Some(caps) = title_regex().captures(line) {
            let title = trim_bullets(caps[1].trim());
            if title.len() > 5 && title.len() < 100 {
                return truncate(title, TITLE_MAX_LEN);
            }
        }
    }

    if let Some(first) = lines.first() {
        let first = trim_bullets(first.trim());
        if first.len() > 5 && first.len() < 100 {
            return truncate(first, TITLE_MAX_LEN);
        }
    }

    "Position".to_string()
}

fn trim_bullets(s: &str) -> &str {
    s.trim_matches(|c: char| c == '-' || c == '*' || c == '#' || c.is_whitespace())
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> Template {
        Template {
            subject: "Application: {{JOB_TITLE}}".into(),
            body: "Hello,\n\nI am {{APPLICANT_NAME}} applying for {{JOB_TITLE}}.\nSource: {{SOURCE_LINK}}\n".into(),
        }
    }

    #[test]
    fn renders_all_placeholders() {
        let rendered = render(
            &template(),
            "Python Developer",
            "https://t.me/jobs/42",
            "Alex Doe",
        );
        assert_eq!(rendered.subject, "Application: Python Developer");
        assert!(rendered.body.contains("Alex Doe"));
        assert!(rendered.body.contains("https://t.me/jobs/42"));
        assert!(!rendered.body.contains("{{"));
    }

    #[test]
    fn validation_passes_for_rendered_email() {
        let rendered = render(&template(), "Dev", "https://t.me/jobs/42", "Alex");
        assert!(validate_rendered(&rendered, "https://t.me/jobs/42", 42).is_ok());
    }

    #[test]
    fn unsubstituted_placeholder_is_fatal() {
        let rendered = Rendered {
            subject: "Application".into(),
            body: "Source: {{SOURCE_LINK}}".into(),
        };
        let result = validate_rendered(&rendered, "https://t.me/jobs/42", 42);
        assert!(matches!(
            result,
            Err(ConfigError::UnrenderedPlaceholder { .. })
        ));
    }

    #[test]
    fn empty_permalink_is_fatal() {
        let rendered = render(&template(), "Dev", "", "Alex");
        let result = validate_rendered(&rendered, "", 42);
        assert!(matches!(result, Err(ConfigError::MissingProvenance { .. })));
    }

    #[test]
    fn body_without_permalink_is_fatal() {
        let rendered = Rendered {
            subject: "Application".into(),
            body: "No provenance".into(),
        };
        let result = validate_rendered(&rendered, "https://t.me/jobs/42", 42);
        assert!(matches!(result, Err(ConfigError::MissingProvenance { .. })));
    }

    #[test]
    fn extracts_labeled_title() {
        let title = extract_job_title("Position: Senior Python Developer\nRemote, full time");
        assert_eq!(title, "Senior Python Developer");
    }

    #[test]
    fn extracts_title_from_later_line() {
        let title = extract_job_title("We are hiring!\nJob title: DevOps Engineer\nApply now");
        assert_eq!(title, "DevOps Engineer");
    }

    #[test]
    fn falls_back_to_first_line() {
        let title = extract_job_title("Backend developer for fintech startup\nDetails below...");
        assert_eq!(title, "Backend developer for fintech startup");
    }

    #[test]
    fn falls_back_to_generic_placeholder() {
        assert_eq!(extract_job_title("hi"), "Position");
        assert_eq!(extract_job_title(""), "Position");
    }

    #[test]
    fn strips_leading_bullets() {
        let title = extract_job_title("## Position: QA Automation Engineer");
        assert_eq!(title, "QA Automation Engineer");
    }

    #[test]
    fn truncates_long_titles() {
        let long = format!("Position: {}", "x".repeat(95));
        let title = extract_job_title(&long);
        assert_eq!(title.len(), 80);
    }
}
