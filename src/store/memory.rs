//! In-memory ledger, used by tests and dry-run experiments.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::pipeline::types::SkipReason;
use crate::store::traits::{DedupKey, Ledger, OutboxEntry, Status};

/// Non-persistent `Ledger` with the same latest-revision semantics as the
/// libSQL backend.
#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<OutboxEntry>>,
    keys: Mutex<HashSet<String>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored revision, in append order.
    pub fn all_revisions(&self) -> Vec<OutboxEntry> {
        self.entries.lock().unwrap().clone()
    }

    fn latest(&self) -> Vec<OutboxEntry> {
        let entries = self.entries.lock().unwrap();
        let mut latest: Vec<OutboxEntry> = Vec::new();
        for entry in entries.iter() {
            match latest.iter_mut().find(|e| e.outbox_id == entry.outbox_id) {
                Some(existing) => {
                    if entry.revision >= existing.revision {
                        *existing = entry.clone();
                    }
                }
                None => latest.push(entry.clone()),
            }
        }
        latest
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn run_migrations(&self) -> Result<(), LedgerError> {
        Ok(())
    }

    async fn append_entry(&self, entry: &OutboxEntry) -> Result<(), LedgerError> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn latest_entries(&self) -> Result<Vec<OutboxEntry>, LedgerError> {
        Ok(self.latest())
    }

    async fn entries_by_status(&self, status: Status) -> Result<Vec<OutboxEntry>, LedgerError> {
        Ok(self
            .latest()
            .into_iter()
            .filter(|e| e.status == status)
            .collect())
    }

    async fn entries_by_skip_reason(
        &self,
        reason: SkipReason,
    ) -> Result<Vec<OutboxEntry>, LedgerError> {
        Ok(self
            .latest()
            .into_iter()
            .filter(|e| e.skip_reason == Some(reason))
            .collect())
    }

    async fn contains_key(&self, key: &DedupKey) -> Result<bool, LedgerError> {
        Ok(self.keys.lock().unwrap().contains(key.as_str()))
    }

    async fn commit_key(&self, key: &DedupKey) -> Result<(), LedgerError> {
        self.keys.lock().unwrap().insert(key.as_str().to_string());
        Ok(())
    }

    async fn sent_count_for_key(&self, key: &DedupKey) -> Result<u64, LedgerError> {
        Ok(self
            .latest()
            .iter()
            .filter(|e| e.status == Status::Sent && e.dedup_key.as_deref() == Some(key.as_str()))
            .count() as u64)
    }
}
