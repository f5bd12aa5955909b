//! Outbound email transport.
//!
//! Delivery is best-effort: failures are logged and swallowed, they never
//! abort the business operation that triggered them.

use std::sync::{Arc, Mutex};

use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{SmtpTransport, Transport};
use thiserror::Error;
use tracing::warn;

use crate::config::EmailConfig;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("message build failed: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// One rendered email, addressed to every recipient of an event.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub subject: String,
    pub plain_body: String,
    pub html_body: String,
    pub recipients: Vec<String>,
}

pub trait EmailSender: Send + Sync {
    fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError>;
}

pub struct SmtpSender {
    config: EmailConfig,
}

impl SmtpSender {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }
}

impl EmailSender for SmtpSender {
    fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        let from: Mailbox = self.config.from.parse()?;

        let mut builder = Message::builder().from(from).subject(&email.subject);
        for recipient in &email.recipients {
            builder = builder.to(recipient.parse()?);
        }
        let message = builder.multipart(MultiPart::alternative_plain_html(
            email.plain_body.clone(),
            email.html_body.clone(),
        ))?;

        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());
        let mailer = SmtpTransport::relay(&self.config.smtp_server)?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        mailer.send(&message)?;
        Ok(())
    }
}

/// In-memory sender used by tests and by deployments that disable SMTP.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<OutgoingEmail>>,
}

impl EmailSender for RecordingSender {
    fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        self.sent
            .lock()
            .expect("recording sender poisoned")
            .push(email.clone());
        Ok(())
    }
}

/// Hand a batch of rendered emails to the transport off the request path.
/// SMTP I/O is blocking, so it runs on the blocking pool.
pub fn deliver(mailer: Arc<dyn EmailSender>, emails: Vec<OutgoingEmail>) {
    if emails.is_empty() {
        return;
    }
    tokio::task::spawn_blocking(move || {
        for email in emails {
            if let Err(e) = mailer.send(&email) {
                warn!(subject = %email.subject, error = %e, "email delivery failed");
            }
        }
    });
}
