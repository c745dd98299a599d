//! Outbound mail transport.
//!
//! The SMTP transport is built with lettre over rustls STARTTLS. Sends are
//! blocking in lettre's sync API, so they run on the blocking pool.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::error::TransportError;

/// One fully prepared outbound application email.
#[derive(Debug, Clone)]
pub struct OutboundMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: PathBuf,
}

/// Mail delivery seam. The orchestrator only sees this trait, so live SMTP
/// and the mock are interchangeable.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Deliver one email. Returns the transport's response line on success.
    async fn send(&self, mail: &OutboundMail) -> Result<String, TransportError>;
}

/// SMTP connection settings from environment variables.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl SmtpConfig {
    /// Load from environment. Returns `None` if SMTP_HOST is unset, in
    /// which case only dry runs are possible.
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SMTP_HOST").ok()?;
        let port = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(587);
        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        let password = SecretString::from(std::env::var("SMTP_PASSWORD").unwrap_or_default());
        let from_address = std::env::var("SMTP_FROM").unwrap_or_else(|_| username.clone());

        Some(Self {
            host,
            port,
            username,
            password,
            from_address,
        })
    }
}

/// Live SMTP mailer.
pub struct SmtpMailer {
    transport: SmtpTransport,
    from_address: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
        let credentials = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );
        let transport = SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| TransportError::Connect(e.to_string()))?
            .port(config.port)
            .credentials(credentials)
            .build();

        info!(host = %config.host, port = config.port, "SMTP transport configured");
        Ok(Self {
            transport,
            from_address: config.from_address.clone(),
        })
    }

    fn build_message(&self, mail: &OutboundMail) -> Result<Message, TransportError> {
        let from = self
            .from_address
            .parse()
            .map_err(|e| TransportError::InvalidAddress {
                address: self.from_address.clone(),
                reason: format!("{e}"),
            })?;
        let to = mail
            .to
            .parse()
            .map_err(|e| TransportError::InvalidAddress {
                address: mail.to.clone(),
                reason: format!("{e}"),
            })?;

        let pdf = std::fs::read(&mail.attachment)?;
        let filename = mail
            .attachment
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cv.pdf".to_string());
        let content_type = ContentType::parse("application/pdf")
            .map_err(|e| TransportError::BuildFailed(e.to_string()))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(&mail.subject)
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(mail.body.clone()))
                    .singlepart(Attachment::new(filename).body(pdf, content_type)),
            )
            .map_err(|e| TransportError::BuildFailed(e.to_string()))
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, mail: &OutboundMail) -> Result<String, TransportError> {
        let message = self.build_message(mail)?;
        let transport = self.transport.clone();

        let response = tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| TransportError::SendFailed(format!("send task panicked: {e}")))?
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        let line = format!(
            "{} {}",
            response.code(),
            response.message().collect::<Vec<_>>().join(" ")
        );
        debug!(to = %mail.to, response = %line, "SMTP send accepted");
        Ok(line)
    }
}

/// Transport that must never be called. Used in dry runs, where reaching
/// the transport at all is a pipeline bug.
pub struct NoopTransport;

#[async_trait]
impl MailTransport for NoopTransport {
    async fn send(&self, mail: &OutboundMail) -> Result<String, TransportError> {
        Err(TransportError::SendFailed(format!(
            "dry-run transport invoked for {}",
            mail.to
        )))
    }
}

/// Recording mock for tests, with optional injected failures.
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<OutboundMail>>,
    fail_indices: Mutex<Vec<usize>>,
    attempts: Mutex<usize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the Nth send attempt (zero-based).
    pub fn fail_attempt(self, index: usize) -> Self {
        self.fail_indices.lock().unwrap().push(index);
        self
    }

    pub fn sent(&self) -> Vec<OutboundMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for MockTransport {
    async fn send(&self, mail: &OutboundMail) -> Result<String, TransportError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let current = *attempts;
            *attempts += 1;
            current
        };
        if self.fail_indices.lock().unwrap().contains(&attempt) {
            return Err(TransportError::SendFailed(format!(
                "injected failure on attempt {attempt}"
            )));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(format!("250 mock queued as {attempt}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(to: &str) -> OutboundMail {
        OutboundMail {
            to: to.into(),
            subject: "Application: Developer".into(),
            body: "Hello\nSource: https://t.me/jobs/1".into(),
            attachment: PathBuf::from("cv/dev.pdf"),
        }
    }

    #[tokio::test]
    async fn mock_records_sends_in_order() {
        let transport = MockTransport::new();
        transport.send(&mail("a@x.com")).await.unwrap();
        transport.send(&mail("b@x.com")).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "a@x.com");
        assert_eq!(sent[1].to, "b@x.com");
    }

    #[tokio::test]
    async fn mock_injected_failure_skips_recording() {
        let transport = MockTransport::new().fail_attempt(0);
        let err = transport.send(&mail("a@x.com")).await.unwrap_err();
        assert!(matches!(err, TransportError::SendFailed(_)));
        assert!(transport.sent().is_empty());

        // Next attempt succeeds.
        transport.send(&mail("b@x.com")).await.unwrap();
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn noop_transport_always_errors() {
        let transport = NoopTransport;
        assert!(transport.send(&mail("a@x.com")).await.is_err());
    }
}
