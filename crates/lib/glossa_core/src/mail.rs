//! Outbound email port.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// Writes messages to the tracing log instead of sending them.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        info!(to = %message.to, subject = %message.subject, "email queued for delivery");
        debug!(body = %message.body, "email body");
        Ok(())
    }
}

/// Keeps every message in memory. Used by tests.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Most recent message to `to`.
    pub fn last_to(&self, to: &str) -> Option<EmailMessage> {
        self.sent().into_iter().rev().find(|m| m.to == to)
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailError::Transport("recording mailer set to fail".into()));
        }
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| MailError::Transport("mailbox lock poisoned".into()))?;
        sent.push(message.clone());
        Ok(())
    }
}

pub fn verification_email(to: &str, base_url: &str, token: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Verify your email address".into(),
        body: format!(
            "Confirm your address by opening this link within 24 hours:\n\n\
             {}/verify-email?token={token}\n",
            base_url.trim_end_matches('/')
        ),
    }
}

pub fn password_reset_email(to: &str, base_url: &str, token: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Reset your password".into(),
        body: format!(
            "A password reset was requested for this address. The link below is \
             valid for one hour:\n\n{}/reset-password?token={token}\n\n\
             If you did not request it, ignore this email.\n",
            base_url.trim_end_matches('/')
        ),
    }
}

pub fn test_email(to: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Glossa test email".into(),
        body: "Mail delivery is configured correctly.\n".into(),
    }
}
