//! Error types for the dispatch engine.

use std::path::PathBuf;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Safety error: {0}")]
    Safety(#[from] SafetyError),
}

/// Configuration errors. All of these are fatal: the run aborts before
/// any send occurs for the offending case.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "APPLY_ENABLED is false while a send was intended. Set APPLY_ENABLED=true to enable sending."
    )]
    KillSwitchDisabled,

    #[error("Send intent flag is not set. Pass APPLY_SEND=true to send, or run without it for a dry run.")]
    SendIntentAbsent,

    #[error("Confirmation flag is not set. Sending requires APPLY_CONFIRM=true.")]
    ConfirmationAbsent,

    #[error("No applicant profiles defined in {0}")]
    NoProfiles(PathBuf),

    #[error("Duplicate profile id: {0}")]
    DuplicateProfileId(String),

    #[error("Profile {profile_id}: template is missing the mandatory {placeholder} placeholder")]
    MissingPlaceholder {
        profile_id: String,
        placeholder: &'static str,
    },

    #[error("Rendered email still contains {placeholder} — refusing to mark as sendable")]
    UnrenderedPlaceholder { placeholder: &'static str },

    #[error("Message {message_id} has no permalink — an application without provenance cannot be sent")]
    MissingProvenance { message_id: i64 },

    #[error("Attachment not found: {0}")]
    AttachmentMissing(PathBuf),

    #[error("Attachment must be a PDF file: {0}")]
    AttachmentNotPdf(PathBuf),

    #[error("Email override index {index} out of range [0, {max}]")]
    EmailIndexOutOfRange { index: usize, max: usize },

    #[error("SMTP transport is not configured (SMTP_HOST unset) but a send was intended")]
    TransportUnconfigured,

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistence errors from the outbox/dedup ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Failed to open ledger: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Outbound transport errors. Non-fatal per message: the entry is recorded
/// as `failed` and the dedup key is left uncommitted so a later run can retry.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    BuildFailed(String),

    #[error("SMTP connection failed: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Safety gate violations. These signal a logic error upstream and abort
/// the whole run rather than degrading to a per-message skip.
#[derive(Debug, thiserror::Error)]
pub enum SafetyError {
    #[error("Safety gate is {state} — a send must never be attempted in this state")]
    GateNotOpenable { state: &'static str },

    #[error("Per-run send budget of {max_per_run} exhausted but a send was still attempted")]
    BudgetExhausted { max_per_run: u32 },

    #[error("Run aborted: {0}")]
    Aborted(String),
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
