//! Outgoing mail.
//!
//! Delivery is a collaborator of the auth workflows. Production relays through
//! SMTP; without a relay configured, mail is only announced in the log. Tests use
//! the in-memory mailer.

use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use parking_lot::Mutex;
use thiserror::Error;

use crate::config::SmtpSettings;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid mail address: {0}")]
    Address(String),
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Mail {
    pub fn verification(to: &str, base_url: &str, user_id: i64, token: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Verify your Novelism account".to_string(),
            body: format!(
                "Welcome to Novelism!\n\n\
                 Confirm your email address by opening the link below:\n\
                 {}/verify-email?userId={}&token={}\n\n\
                 Your verification code is: {}\n",
                base_url.trim_end_matches('/'),
                user_id,
                token,
                token
            ),
        }
    }

    pub fn password_reset(to: &str, base_url: &str, user_id: i64, token: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Reset your Novelism password".to_string(),
            body: format!(
                "A password reset was requested for your account.\n\n\
                 Choose a new password here:\n\
                 {}/reset-password?userId={}&token={}\n\n\
                 If you did not request this, you can ignore this message.\n",
                base_url.trim_end_matches('/'),
                user_id,
                token
            ),
        }
    }
}

pub trait Mailer: Send + Sync {
    fn send(&self, mail: Mail) -> BoxFuture<'_, Result<(), MailError>>;
}

/// Delivers through an SMTP relay with STARTTLS.
pub struct SmtpMailer {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings, from: &str) -> Result<Self, MailError> {
        let from = from
            .parse::<Mailbox>()
            .map_err(|e| MailError::Address(format!("{}: {}", from, e)))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .map_err(|e| MailError::Delivery(e.to_string()))?
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(Self { from, transport })
    }

    fn message(&self, mail: Mail) -> Result<Message, MailError> {
        let to = mail
            .to
            .parse::<Mailbox>()
            .map_err(|e| MailError::Address(format!("{}: {}", mail.to, e)))?;
        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body)
            .map_err(|e| MailError::Delivery(e.to_string()))
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, mail: Mail) -> BoxFuture<'_, Result<(), MailError>> {
        async move {
            let to = mail.to.clone();
            let message = self.message(mail)?;
            self.transport
                .send(message)
                .await
                .map_err(|e| MailError::Delivery(e.to_string()))?;
            log::info!("mail delivered to {}", to);
            Ok(())
        }
        .boxed()
    }
}

/// Announces messages in the log without delivering them. Bodies carry
/// single-use tokens and are never logged.
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }

    fn summary(&self, mail: &Mail) -> String {
        format!(
            "mail not delivered (no SMTP relay configured): from={} to={} subject={:?}",
            self.from, mail.to, mail.subject
        )
    }
}

impl Mailer for LogMailer {
    fn send(&self, mail: Mail) -> BoxFuture<'_, Result<(), MailError>> {
        log::warn!("{}", self.summary(&mail));
        future::ready(Ok(())).boxed()
    }
}

/// Keeps sent messages in memory. Can be switched to fail every delivery.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<Mail>>,
    failing: Mutex<bool>,
}

impl MemoryMailer {
    pub fn sent(&self) -> Vec<Mail> {
        self.sent.lock().clone()
    }

    pub fn last_to(&self, to: &str) -> Option<Mail> {
        self.sent.lock().iter().rev().find(|m| m.to == to).cloned()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

impl Mailer for MemoryMailer {
    fn send(&self, mail: Mail) -> BoxFuture<'_, Result<(), MailError>> {
        let result = if *self.failing.lock() {
            Err(MailError::Delivery(format!("refusing to deliver to {}", mail.to)))
        } else {
            self.sent.lock().push(mail);
            Ok(())
        };
        future::ready(result).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_mail_carries_token() {
        let mail = Mail::verification("a@example.com", "https://novelism.app/", 7, "abc123");

        assert_eq!(mail.to, "a@example.com");
        assert!(mail.body.contains("https://novelism.app/verify-email?userId=7&token=abc123"));
    }

    #[actix_rt::test]
    async fn test_memory_mailer_records_and_fails() {
        let mailer = MemoryMailer::default();
        mailer
            .send(Mail::password_reset("b@example.com", "http://localhost", 2, "t"))
            .await
            .unwrap();
        assert_eq!(mailer.sent().len(), 1);
        assert!(mailer.last_to("b@example.com").is_some());

        mailer.set_failing(true);
        let result = mailer
            .send(Mail::password_reset("b@example.com", "http://localhost", 2, "t"))
            .await;
        assert!(result.is_err());
        assert_eq!(mailer.sent().len(), 1);
    }

    #[test]
    fn test_log_mailer_keeps_tokens_out_of_the_log() {
        let mailer = LogMailer::new("Novelism <no-reply@novelism.local>");
        let mail = Mail::password_reset("c@example.com", "http://localhost", 3, "SECRETTOKEN");
        assert!(mail.body.contains("SECRETTOKEN"));

        let summary = mailer.summary(&mail);
        assert!(summary.contains("c@example.com"));
        assert!(!summary.contains("SECRETTOKEN"));
    }

    fn smtp_settings() -> SmtpSettings {
        SmtpSettings {
            host: "smtp.example.com".into(),
            port: 587,
            username: "mailer".into(),
            password: "hunter2".into(),
        }
    }

    #[actix_rt::test]
    async fn test_smtp_mailer_rejects_bad_addresses() {
        assert!(matches!(
            SmtpMailer::new(&smtp_settings(), "not an address"),
            Err(MailError::Address(_))
        ));

        let mailer = SmtpMailer::new(&smtp_settings(), "Novelism <no-reply@novelism.local>").unwrap();
        let message = mailer
            .message(Mail::verification("reader@example.com", "http://localhost", 1, "t"))
            .unwrap();
        assert!(String::from_utf8_lossy(&message.formatted()).contains("reader@example.com"));

        let result = mailer
            .send(Mail::verification("nobody", "http://localhost", 1, "t"))
            .await;
        assert!(matches!(result, Err(MailError::Address(_))));
    }
}
