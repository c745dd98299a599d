//! Ledger trait and audit record types.
//!
//! The dedup set and the outbox audit trail are one store behind a single
//! async trait, owned by the orchestrator and passed into the pipeline —
//! never ambient global state — so tests can substitute a memory double.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::pipeline::types::SkipReason;

/// Dispatch status of an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Draft,
    Sent,
    Skipped,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "sent" => Some(Self::Sent),
            "skipped" => Some(Self::Skipped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// The sole identity of "has this application already gone out":
/// `chat_id:message_id:email`, independent of profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey(String);

impl DedupKey {
    /// Build the composite key. The email is lowercased so casing variants
    /// of the same address cannot slip past the ledger.
    pub fn new(chat_id: i64, message_id: i64, email: &str) -> Self {
        Self(format!("{chat_id}:{message_id}:{}", email.to_lowercase()))
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One immutable audit record for one (message, profile) decision.
///
/// Entries are write-once; corrections are appended as new revisions of the
/// same `outbox_id`. The highest revision is the effective record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub outbox_id: Uuid,
    pub revision: u32,
    pub source_id: String,
    pub chat_id: i64,
    pub message_id: i64,
    pub permalink: String,
    pub profile_id: Option<String>,
    pub job_title: String,
    pub extracted_emails: Vec<String>,
    pub selected_email: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub cv_path: Option<String>,
    pub status: Status,
    pub skip_reason: Option<SkipReason>,
    pub dedup_key: Option<String>,
    pub routing_scores: Vec<(String, f64)>,
    /// Number of transport attempts recorded for this entry. A latest
    /// revision that is still `draft` with attempts > 0 means the run was
    /// interrupted mid-send and the outcome is unknown.
    pub attempt_count: u32,
    pub template_validated: bool,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub transport_response: Option<String>,
}

impl OutboxEntry {
    /// Next revision of this entry, timestamped now.
    pub fn next_revision(&self) -> Self {
        let mut next = self.clone();
        next.revision += 1;
        next.created_at = Utc::now();
        next
    }
}

/// Aggregate ledger statistics by status and skip reason.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerStats {
    pub total: u64,
    pub draft: u64,
    pub sent: u64,
    pub skipped: u64,
    pub failed: u64,
    pub by_skip_reason: BTreeMap<String, u64>,
}

/// Persistent outbox + dedup ledger.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), LedgerError>;

    /// Append one entry revision. Appends are atomic: an entry is either
    /// fully written or entirely absent, never half-written.
    async fn append_entry(&self, entry: &OutboxEntry) -> Result<(), LedgerError>;

    /// Latest revision of every entry, in insertion order.
    async fn latest_entries(&self) -> Result<Vec<OutboxEntry>, LedgerError>;

    /// Latest-revision entries with the given status.
    async fn entries_by_status(&self, status: Status) -> Result<Vec<OutboxEntry>, LedgerError>;

    /// Latest-revision entries with the given skip reason.
    async fn entries_by_skip_reason(
        &self,
        reason: SkipReason,
    ) -> Result<Vec<OutboxEntry>, LedgerError>;

    /// Whether a dedup key has been committed — i.e. an application for
    /// this (chat, message, email) triple has already gone out.
    async fn contains_key(&self, key: &DedupKey) -> Result<bool, LedgerError>;

    /// Commit a dedup key. Called only after a transport send has been
    /// confirmed successful and its outbox entry is durable — never at
    /// draft time and never before the send attempt.
    async fn commit_key(&self, key: &DedupKey) -> Result<(), LedgerError>;

    /// Number of latest-revision `sent` entries carrying this dedup key.
    /// At most one may ever exist across the lifetime of the ledger.
    async fn sent_count_for_key(&self, key: &DedupKey) -> Result<u64, LedgerError>;

    /// Aggregate statistics over latest revisions.
    async fn statistics(&self) -> Result<LedgerStats, LedgerError> {
        let mut stats = LedgerStats::default();
        for entry in self.latest_entries().await? {
            stats.total += 1;
            match entry.status {
                Status::Draft => stats.draft += 1,
                Status::Sent => stats.sent += 1,
                Status::Skipped => stats.skipped += 1,
                Status::Failed => stats.failed += 1,
            }
            if entry.status == Status::Skipped {
                if let Some(reason) = entry.skip_reason {
                    *stats
                        .by_skip_reason
                        .entry(reason.as_str().to_string())
                        .or_insert(0) += 1;
                }
            }
        }
        Ok(stats)
    }
}

/// Minimal draft entry for tests.
#[cfg(test)]
pub(crate) fn test_entry(chat_id: i64, message_id: i64) -> OutboxEntry {
    OutboxEntry {
        outbox_id: Uuid::new_v4(),
        revision: 0,
        source_id: "test_feed".into(),
        chat_id,
        message_id,
        permalink: format!("https://t.me/test_feed/{message_id}"),
        profile_id: Some("dev".into()),
        job_title: "Developer".into(),
        extracted_emails: vec!["jobs@x.com".into()],
        selected_email: Some("jobs@x.com".into()),
        subject: Some("Application: Developer".into()),
        body: Some(format!("Source: https://t.me/test_feed/{message_id}")),
        cv_path: Some("cv/dev.pdf".into()),
        status: Status::Draft,
        skip_reason: None,
        dedup_key: Some(DedupKey::new(chat_id, message_id, "jobs@x.com").as_str().into()),
        routing_scores: vec![("dev".into(), 2.0)],
        attempt_count: 0,
        template_validated: true,
        created_at: Utc::now(),
        sent_at: None,
        last_error: None,
        transport_response: None,
    }
}
