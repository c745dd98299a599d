//! Sequential dispatch pipeline.
//!
//! Each message flows through classify → route → extract → dedup → draft →
//! gate → send, and every decision lands in the ledger as an outbox entry.
//! A dry run executes the identical pipeline up to and including the draft;
//! only the gate and transport stages are live-only.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classify::RelevanceClassifier;
use crate::config::RunParams;
use crate::error::{Result, SafetyError};
use crate::feed::Message;
use crate::gate::{GateState, SafetyGate};
use crate::pipeline::types::{RunStats, SkipReason};
use crate::pipeline::{email, router, templates};
use crate::profile::Profile;
use crate::store::{DedupKey, Ledger, OutboxEntry, Status};
use crate::transport::{MailTransport, OutboundMail};

/// What startup recovery found in the ledger.
#[derive(Debug, Default, Clone)]
pub struct RecoveryReport {
    /// Sent entries whose dedup key was missing and has been re-committed.
    pub recommitted_keys: u64,
    /// Interrupted sends with unknown outcome, closed as failed with their
    /// key committed so they are never retried.
    pub unknown_outcomes: u64,
}

/// Drives the full decision pipeline for one run.
pub struct DispatchOrchestrator {
    classifier: RelevanceClassifier,
    profiles: Vec<Profile>,
    params: RunParams,
    ledger: Arc<dyn Ledger>,
    gate: SafetyGate,
    transport: Arc<dyn MailTransport>,
}

impl DispatchOrchestrator {
    pub fn new(
        classifier: RelevanceClassifier,
        profiles: Vec<Profile>,
        params: RunParams,
        ledger: Arc<dyn Ledger>,
        gate: SafetyGate,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        Self {
            classifier,
            profiles,
            params,
            ledger,
            gate,
            transport,
        }
    }

    /// Reconcile the ledger after a possible crash.
    ///
    /// Two repairs, both biased toward never sending twice:
    /// - a `sent` entry whose dedup key was never committed gets its key
    ///   re-committed;
    /// - a latest `draft` revision with recorded send attempts means the
    ///   process died mid-send. The outcome is unknown, so the entry is
    ///   closed as `failed` and its key committed anyway. A duplicate
    ///   application harms more than a missed one.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for entry in self.ledger.entries_by_status(Status::Sent).await? {
            if let Some(raw) = &entry.dedup_key {
                let key = DedupKey::from_raw(raw.clone());
                if !self.ledger.contains_key(&key).await? {
                    self.ledger.commit_key(&key).await?;
                    report.recommitted_keys += 1;
                    warn!(key = %key, "Re-committed dedup key for sent entry");
                }
            }
        }

        for entry in self.ledger.entries_by_status(Status::Draft).await? {
            if entry.attempt_count == 0 {
                continue;
            }
            let mut closed = entry.next_revision();
            closed.status = Status::Failed;
            closed.last_error =
                Some("interrupted during send; outcome unknown, not retrying".to_string());
            self.ledger.append_entry(&closed).await?;

            if let Some(raw) = &entry.dedup_key {
                self.ledger
                    .commit_key(&DedupKey::from_raw(raw.clone()))
                    .await?;
            }
            report.unknown_outcomes += 1;
            warn!(
                outbox_id = %entry.outbox_id,
                message_id = entry.message_id,
                "Closed interrupted send as failed"
            );
        }

        if report.recommitted_keys > 0 || report.unknown_outcomes > 0 {
            info!(
                recommitted = report.recommitted_keys,
                unknown = report.unknown_outcomes,
                "Ledger recovery applied"
            );
        }
        Ok(report)
    }

    /// Process one feed of messages.
    pub async fn run(&mut self, messages: &[Message]) -> Result<RunStats> {
        let live = self.params.live();
        if self.params.send {
            // Any send intent demands the full signal set; arming surfaces
            // the precise missing signal as a fatal error before the first
            // message is touched.
            if self.gate.state() == GateState::Closed {
                self.gate.arm().await?;
            }
        } else {
            info!("Dry run: drafting only, no sends");
        }

        let mut stats = RunStats::default();
        let mut taken = 0usize;

        for message in messages {
            if let Some(source) = &self.params.source {
                if &message.source_id != source {
                    continue;
                }
            }
            if let Some(limit) = self.params.limit {
                if taken >= limit {
                    break;
                }
            }
            taken += 1;

            self.process_message(message, live, &mut stats).await?;
        }

        info!(
            processed = stats.processed,
            relevant = stats.relevant,
            drafted = stats.drafted,
            sent = stats.sent,
            skipped = stats.skipped,
            failed = stats.failed,
            "Run complete"
        );
        Ok(stats)
    }

    async fn process_message(
        &mut self,
        message: &Message,
        live: bool,
        stats: &mut RunStats,
    ) -> Result<()> {
        stats.processed += 1;

        let classification = self.classifier.classify(&message.text);
        if !classification.relevant {
            debug!(
                message_id = message.message_id,
                score = classification.score,
                "Not relevant"
            );
            let mut entry = base_entry(message);
            entry.status = Status::Skipped;
            entry.skip_reason = Some(SkipReason::NotRelevant);
            self.ledger.append_entry(&entry).await?;
            stats.record_skip(SkipReason::NotRelevant);
            return Ok(());
        }
        stats.relevant += 1;

        let routing = router::route(message.message_id, &message.text, &self.profiles);
        if let Some(reason) = routing.skip {
            let mut entry = base_entry(message);
            entry.status = Status::Skipped;
            entry.skip_reason = Some(reason);
            entry.routing_scores = routing.scores;
            self.ledger.append_entry(&entry).await?;
            stats.record_skip(reason);
            return Ok(());
        }
        let Some(profile) = routing
            .profile_id
            .as_deref()
            .and_then(|id| self.profiles.iter().find(|p| p.id == id))
        else {
            return Ok(());
        };

        let candidates = email::extract_emails(&message.text);
        let resolution = email::resolve(candidates, self.params.pick_email)?;
        let Some(selected) = resolution.selected_email().map(str::to_string) else {
            let reason = resolution
                .skip
                .unwrap_or(SkipReason::NoEmailFound);
            let mut entry = base_entry(message);
            entry.status = Status::Skipped;
            entry.skip_reason = Some(reason);
            entry.profile_id = Some(profile.id.clone());
            entry.extracted_emails = resolution.candidates;
            entry.routing_scores = routing.scores;
            self.ledger.append_entry(&entry).await?;
            stats.record_skip(reason);
            return Ok(());
        };

        let key = DedupKey::new(message.chat_id, message.message_id, &selected);
        if self.ledger.contains_key(&key).await? {
            debug!(message_id = message.message_id, key = %key, "Duplicate");
            let mut entry = base_entry(message);
            entry.status = Status::Skipped;
            entry.skip_reason = Some(SkipReason::Duplicate);
            entry.profile_id = Some(profile.id.clone());
            entry.selected_email = Some(selected);
            entry.dedup_key = Some(key.as_str().to_string());
            self.ledger.append_entry(&entry).await?;
            stats.record_skip(SkipReason::Duplicate);
            return Ok(());
        }

        let job_title = templates::extract_job_title(&message.text);
        let rendered = templates::render(
            &profile.template,
            &job_title,
            &message.permalink,
            &profile.applicant_name,
        );
        templates::validate_rendered(&rendered, &message.permalink, message.message_id)?;

        let mut draft = base_entry(message);
        draft.profile_id = Some(profile.id.clone());
        draft.job_title = job_title;
        draft.extracted_emails = resolution.candidates;
        draft.selected_email = Some(selected.clone());
        draft.subject = Some(rendered.subject.clone());
        draft.body = Some(rendered.body.clone());
        draft.cv_path = Some(profile.cv_path.display().to_string());
        draft.status = Status::Draft;
        draft.dedup_key = Some(key.as_str().to_string());
        draft.routing_scores = routing.scores;
        draft.template_validated = true;
        self.ledger.append_entry(&draft).await?;
        stats.drafted += 1;
        info!(
            message_id = message.message_id,
            profile = %profile.id,
            to = %selected,
            "Drafted application"
        );

        if !live {
            return Ok(());
        }

        if self.gate.state() == GateState::Aborted {
            return Err(SafetyError::Aborted("gate aborted earlier in this run".into()).into());
        }
        if self.gate.remaining_budget() == 0 {
            debug!(
                message_id = message.message_id,
                "Send budget exhausted, leaving draft"
            );
            return Ok(());
        }

        self.gate.open_for_send(&profile.cv_path).await?;

        // Attempt marker before the transport call: if we crash during the
        // send, recovery sees a draft with attempts > 0 and knows the
        // outcome is unknown.
        let mut in_flight = draft.next_revision();
        in_flight.attempt_count = draft.attempt_count + 1;
        self.ledger.append_entry(&in_flight).await?;

        let mail = OutboundMail {
            to: selected.clone(),
            subject: rendered.subject,
            body: rendered.body,
            attachment: profile.cv_path.clone(),
        };
        let outcome = self.transport.send(&mail).await;
        self.gate.close_after_send();

        match outcome {
            Ok(response) => {
                let mut sent = in_flight.next_revision();
                sent.status = Status::Sent;
                sent.sent_at = Some(Utc::now());
                sent.transport_response = Some(response);
                self.ledger.append_entry(&sent).await?;
                // Key commit strictly after the sent entry is durable, so a
                // crash between the two favors the key being absent and
                // recovery re-committing it.
                self.ledger.commit_key(&key).await?;
                stats.sent += 1;
                info!(message_id = message.message_id, to = %selected, "Application sent");
            }
            Err(e) => {
                let mut failed = in_flight.next_revision();
                failed.status = Status::Failed;
                failed.last_error = Some(e.to_string());
                self.ledger.append_entry(&failed).await?;
                stats.failed += 1;
                warn!(
                    message_id = message.message_id,
                    to = %selected,
                    error = %e,
                    "Send failed, key not committed"
                );
            }
        }

        Ok(())
    }
}

fn base_entry(message: &Message) -> OutboxEntry {
    OutboxEntry {
        outbox_id: Uuid::new_v4(),
        revision: 0,
        source_id: message.source_id.clone(),
        chat_id: message.chat_id,
        message_id: message.message_id,
        permalink: message.permalink.clone(),
        profile_id: None,
        job_title: String::new(),
        extracted_emails: Vec::new(),
        selected_email: None,
        subject: None,
        body: None,
        cv_path: None,
        status: Status::Skipped,
        skip_reason: None,
        dedup_key: None,
        routing_scores: Vec::new(),
        attempt_count: 0,
        template_validated: false,
        created_at: Utc::now(),
        sent_at: None,
        last_error: None,
        transport_response: None,
    }
}
