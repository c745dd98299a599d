//! libSQL ledger backend.
//!
//! One local database holds both the append-only outbox and the committed
//! dedup keys. Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::pipeline::types::SkipReason;
use crate::store::migrations;
use crate::store::traits::{DedupKey, Ledger, OutboxEntry, Status};

/// libSQL ledger.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlLedger {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlLedger {
    /// Open (or create) a local database file.
    pub async fn new_local(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                LedgerError::Open(format!("Failed to create ledger directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LedgerError::Open(format!("Failed to open ledger database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| LedgerError::Open(format!("Failed to create connection: {e}")))?;

        info!(path = %path.display(), "Ledger opened");
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory ledger (for tests).
    pub async fn new_memory() -> Result<Self, LedgerError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| LedgerError::Open(format!("Failed to create in-memory ledger: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| LedgerError::Open(format!("Failed to create connection: {e}")))?;

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

const ENTRY_COLUMNS: &str = "outbox_id, revision, source_id, chat_id, message_id, permalink, \
     profile_id, job_title, extracted_emails, selected_email, subject, body, cv_path, \
     status, skip_reason, dedup_key, routing_scores, attempt_count, template_validated, \
     created_at, sent_at, last_error, transport_response";

/// Latest revision of every entry, preserving first-insertion order.
const LATEST_QUERY_PREFIX: &str = "SELECT o.outbox_id, o.revision, o.source_id, o.chat_id, \
     o.message_id, o.permalink, o.profile_id, o.job_title, o.extracted_emails, \
     o.selected_email, o.subject, o.body, o.cv_path, o.status, o.skip_reason, o.dedup_key, \
     o.routing_scores, o.attempt_count, o.template_validated, o.created_at, o.sent_at, \
     o.last_error, o.transport_response \
     FROM outbox o \
     JOIN (SELECT outbox_id, MAX(revision) AS max_rev, MIN(rowid) AS first_row \
           FROM outbox GROUP BY outbox_id) latest \
       ON o.outbox_id = latest.outbox_id AND o.revision = latest.max_rev";

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn row_to_entry(row: &libsql::Row) -> Result<OutboxEntry, LedgerError> {
    let get_err = |e: libsql::Error| LedgerError::Query(format!("Failed to read outbox row: {e}"));

    let outbox_id_str: String = row.get(0).map_err(get_err)?;
    let outbox_id = Uuid::parse_str(&outbox_id_str)
        .map_err(|e| LedgerError::Serialization(format!("Invalid outbox_id: {e}")))?;
    let revision: i64 = row.get(1).map_err(get_err)?;
    let source_id: String = row.get(2).map_err(get_err)?;
    let chat_id: i64 = row.get(3).map_err(get_err)?;
    let message_id: i64 = row.get(4).map_err(get_err)?;
    let permalink: String = row.get(5).map_err(get_err)?;
    let profile_id: Option<String> = row.get(6).map_err(get_err)?;
    let job_title: String = row.get(7).map_err(get_err)?;
    let extracted_emails_json: String = row.get(8).map_err(get_err)?;
    let selected_email: Option<String> = row.get(9).map_err(get_err)?;
    let subject: Option<String> = row.get(10).map_err(get_err)?;
    let body: Option<String> = row.get(11).map_err(get_err)?;
    let cv_path: Option<String> = row.get(12).map_err(get_err)?;
    let status_str: String = row.get(13).map_err(get_err)?;
    let skip_reason_str: Option<String> = row.get(14).map_err(get_err)?;
    let dedup_key: Option<String> = row.get(15).map_err(get_err)?;
    let routing_scores_json: String = row.get(16).map_err(get_err)?;
    let attempt_count: i64 = row.get(17).map_err(get_err)?;
    let template_validated: i64 = row.get(18).map_err(get_err)?;
    let created_at_str: String = row.get(19).map_err(get_err)?;
    let sent_at_str: Option<String> = row.get(20).map_err(get_err)?;
    let last_error: Option<String> = row.get(21).map_err(get_err)?;
    let transport_response: Option<String> = row.get(22).map_err(get_err)?;

    let status = Status::parse(&status_str)
        .ok_or_else(|| LedgerError::Serialization(format!("Unknown status '{status_str}'")))?;
    let skip_reason = match skip_reason_str {
        Some(s) => Some(SkipReason::parse(&s).ok_or_else(|| {
            LedgerError::Serialization(format!("Unknown skip reason '{s}'"))
        })?),
        None => None,
    };
    let extracted_emails: Vec<String> = serde_json::from_str(&extracted_emails_json)
        .map_err(|e| LedgerError::Serialization(format!("Invalid extracted_emails: {e}")))?;
    let routing_scores: Vec<(String, f64)> = serde_json::from_str(&routing_scores_json)
        .map_err(|e| LedgerError::Serialization(format!("Invalid routing_scores: {e}")))?;

    Ok(OutboxEntry {
        outbox_id,
        revision: revision as u32,
        source_id,
        chat_id,
        message_id,
        permalink,
        profile_id,
        job_title,
        extracted_emails,
        selected_email,
        subject,
        body,
        cv_path,
        status,
        skip_reason,
        dedup_key,
        routing_scores,
        attempt_count: attempt_count as u32,
        template_validated: template_validated != 0,
        created_at: parse_datetime(&created_at_str),
        sent_at: sent_at_str.as_deref().map(parse_datetime),
        last_error,
        transport_response,
    })
}

async fn collect_entries(mut rows: libsql::Rows) -> Result<Vec<OutboxEntry>, LedgerError> {
    let mut entries = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| LedgerError::Query(format!("Failed to iterate outbox rows: {e}")))?
    {
        entries.push(row_to_entry(&row)?);
    }
    Ok(entries)
}

#[async_trait]
impl Ledger for LibSqlLedger {
    async fn run_migrations(&self) -> Result<(), LedgerError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn append_entry(&self, entry: &OutboxEntry) -> Result<(), LedgerError> {
        let extracted_emails = serde_json::to_string(&entry.extracted_emails)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let routing_scores = serde_json::to_string(&entry.routing_scores)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;

        let sql = format!(
            "INSERT INTO outbox ({ENTRY_COLUMNS}) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, \
              ?18, ?19, ?20, ?21, ?22, ?23)"
        );
        self.conn()
            .execute(
                &sql,
                params![
                    entry.outbox_id.to_string(),
                    entry.revision as i64,
                    entry.source_id.clone(),
                    entry.chat_id,
                    entry.message_id,
                    entry.permalink.clone(),
                    entry.profile_id.clone(),
                    entry.job_title.clone(),
                    extracted_emails,
                    entry.selected_email.clone(),
                    entry.subject.clone(),
                    entry.body.clone(),
                    entry.cv_path.clone(),
                    entry.status.as_str(),
                    entry.skip_reason.map(|r| r.as_str()),
                    entry.dedup_key.clone(),
                    routing_scores,
                    entry.attempt_count as i64,
                    entry.template_validated as i64,
                    entry.created_at.to_rfc3339(),
                    entry.sent_at.map(|t| t.to_rfc3339()),
                    entry.last_error.clone(),
                    entry.transport_response.clone(),
                ],
            )
            .await
            .map_err(|e| LedgerError::Query(format!("Failed to append outbox entry: {e}")))?;
        Ok(())
    }

    async fn latest_entries(&self) -> Result<Vec<OutboxEntry>, LedgerError> {
        let sql = format!("{LATEST_QUERY_PREFIX} ORDER BY latest.first_row");
        let rows = self
            .conn()
            .query(&sql, ())
            .await
            .map_err(|e| LedgerError::Query(format!("Failed to query outbox: {e}")))?;
        collect_entries(rows).await
    }

    async fn entries_by_status(&self, status: Status) -> Result<Vec<OutboxEntry>, LedgerError> {
        let sql = format!("{LATEST_QUERY_PREFIX} WHERE o.status = ?1 ORDER BY latest.first_row");
        let rows = self
            .conn()
            .query(&sql, params![status.as_str()])
            .await
            .map_err(|e| LedgerError::Query(format!("Failed to query outbox by status: {e}")))?;
        collect_entries(rows).await
    }

    async fn entries_by_skip_reason(
        &self,
        reason: SkipReason,
    ) -> Result<Vec<OutboxEntry>, LedgerError> {
        let sql =
            format!("{LATEST_QUERY_PREFIX} WHERE o.skip_reason = ?1 ORDER BY latest.first_row");
        let rows = self
            .conn()
            .query(&sql, params![reason.as_str()])
            .await
            .map_err(|e| LedgerError::Query(format!("Failed to query outbox by reason: {e}")))?;
        collect_entries(rows).await
    }

    async fn contains_key(&self, key: &DedupKey) -> Result<bool, LedgerError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM dedup_keys WHERE key = ?1",
                params![key.as_str()],
            )
            .await
            .map_err(|e| LedgerError::Query(format!("Failed to query dedup key: {e}")))?;
        let row = rows
            .next()
            .await
            .map_err(|e| LedgerError::Query(format!("Failed to read dedup key: {e}")))?;
        match row {
            Some(row) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| LedgerError::Query(format!("Failed to parse count: {e}")))?;
                Ok(count > 0)
            }
            None => Ok(false),
        }
    }

    async fn commit_key(&self, key: &DedupKey) -> Result<(), LedgerError> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO dedup_keys (key) VALUES (?1)",
                params![key.as_str()],
            )
            .await
            .map_err(|e| LedgerError::Query(format!("Failed to commit dedup key: {e}")))?;
        Ok(())
    }

    async fn sent_count_for_key(&self, key: &DedupKey) -> Result<u64, LedgerError> {
        let sql = format!(
            "SELECT COUNT(*) FROM ({LATEST_QUERY_PREFIX}) WHERE status = 'sent' AND dedup_key = ?1"
        );
        let mut rows = self
            .conn()
            .query(&sql, params![key.as_str()])
            .await
            .map_err(|e| LedgerError::Query(format!("Failed to count sent entries: {e}")))?;
        let row = rows
            .next()
            .await
            .map_err(|e| LedgerError::Query(format!("Failed to read sent count: {e}")))?;
        match row {
            Some(row) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| LedgerError::Query(format!("Failed to parse count: {e}")))?;
                Ok(count as u64)
            }
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::traits::test_entry;

    async fn test_ledger() -> LibSqlLedger {
        let ledger = LibSqlLedger::new_memory().await.unwrap();
        ledger.run_migrations().await.unwrap();
        ledger
    }

    #[tokio::test]
    async fn appended_entry_round_trips() {
        let ledger = test_ledger().await;
        let mut entry = test_entry(1, 100);
        entry.extracted_emails = vec!["jobs@x.com".into(), "hr@x.com".into()];
        entry.routing_scores = vec![("dev".into(), 2.0), ("ops".into(), 0.5)];
        entry.skip_reason = Some(SkipReason::Duplicate);
        entry.status = Status::Skipped;
        ledger.append_entry(&entry).await.unwrap();

        let entries = ledger.latest_entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        let got = &entries[0];
        assert_eq!(got.outbox_id, entry.outbox_id);
        assert_eq!(got.extracted_emails, entry.extracted_emails);
        assert_eq!(got.routing_scores, entry.routing_scores);
        assert_eq!(got.status, Status::Skipped);
        assert_eq!(got.skip_reason, Some(SkipReason::Duplicate));
    }

    #[tokio::test]
    async fn latest_revision_wins() {
        let ledger = test_ledger().await;
        let draft = test_entry(1, 100);
        ledger.append_entry(&draft).await.unwrap();

        let mut sent = draft.next_revision();
        sent.status = Status::Sent;
        sent.sent_at = Some(Utc::now());
        ledger.append_entry(&sent).await.unwrap();

        let entries = ledger.latest_entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].revision, 1);
        assert_eq!(entries[0].status, Status::Sent);

        // Both revisions remain on disk.
        let mut rows = ledger
            .conn()
            .query("SELECT COUNT(*) FROM outbox", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let count: i64 = row.get(0).unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn filters_by_status_and_reason() {
        let ledger = test_ledger().await;
        let mut skipped = test_entry(1, 100);
        skipped.status = Status::Skipped;
        skipped.skip_reason = Some(SkipReason::NoEmailFound);
        ledger.append_entry(&skipped).await.unwrap();

        let mut sent = test_entry(1, 101);
        sent.status = Status::Sent;
        ledger.append_entry(&sent).await.unwrap();

        let by_status = ledger.entries_by_status(Status::Sent).await.unwrap();
        assert_eq!(by_status.len(), 1);
        assert_eq!(by_status[0].message_id, 101);

        let by_reason = ledger
            .entries_by_skip_reason(SkipReason::NoEmailFound)
            .await
            .unwrap();
        assert_eq!(by_reason.len(), 1);
        assert_eq!(by_reason[0].message_id, 100);
    }

    #[tokio::test]
    async fn dedup_keys_commit_and_check() {
        let ledger = test_ledger().await;
        let key = DedupKey::new(1, 100, "jobs@x.com");
        assert!(!ledger.contains_key(&key).await.unwrap());

        ledger.commit_key(&key).await.unwrap();
        assert!(ledger.contains_key(&key).await.unwrap());

        // Re-committing is idempotent.
        ledger.commit_key(&key).await.unwrap();
        assert!(ledger.contains_key(&key).await.unwrap());
    }

    #[tokio::test]
    async fn sent_count_tracks_latest_revisions_only() {
        let ledger = test_ledger().await;
        let key = DedupKey::new(1, 100, "jobs@x.com");

        let mut draft = test_entry(1, 100);
        draft.dedup_key = Some(key.as_str().to_string());
        ledger.append_entry(&draft).await.unwrap();
        assert_eq!(ledger.sent_count_for_key(&key).await.unwrap(), 0);

        let mut sent = draft.next_revision();
        sent.status = Status::Sent;
        ledger.append_entry(&sent).await.unwrap();
        assert_eq!(ledger.sent_count_for_key(&key).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn statistics_aggregate_latest_revisions() {
        let ledger = test_ledger().await;
        let mut skipped = test_entry(1, 100);
        skipped.status = Status::Skipped;
        skipped.skip_reason = Some(SkipReason::Duplicate);
        ledger.append_entry(&skipped).await.unwrap();

        let mut sent = test_entry(1, 101);
        sent.status = Status::Sent;
        ledger.append_entry(&sent).await.unwrap();

        let stats = ledger.statistics().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.by_skip_reason["duplicate"], 1);
    }
}
