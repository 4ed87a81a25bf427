//! SMTP email notifier via `lettre`.
//!
//! The transport is opened, used and dropped inside each `send`, so no SMTP
//! session outlives a single report.

use std::fmt;
use std::time::Duration;

use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};

use crate::{Notifier, NotifyError, NotifyFut};

pub const REPORT_SUBJECT: &str = "Summary Comparison Results";

const SMTP_TIMEOUT_SECS: u64 = 30;

/// Environment variables read by [`EmailConfig::from_lookup`].
const ENV_ADDRESS: &str = "EMAIL_ADDRESS";
const ENV_PASSWORD: &str = "EMAIL_PASSWORD";
const ENV_SERVER: &str = "SMTP_SERVER";
const ENV_PORT: &str = "SMTP_PORT";
const ENV_TO: &str = "TO_EMAIL";

#[must_use]
pub fn report_body(report: &str) -> String {
    format!("Comparison Result:\n{report}")
}

/// Unvalidated email settings.
///
/// Every field is optional so a partially configured notifier can exist;
/// [`EmailConfig::validate`] reports what is missing.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EmailConfig {
    /// Sender address, also the SMTP login.
    pub address: Option<String>,
    pub password: Option<String>,
    pub smtp_server: Option<String>,
    /// Kept as text so a malformed port is a send-time error.
    pub smtp_port: Option<String>,
    /// Recipient address.
    pub to: Option<String>,
}

impl fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailConfig")
            .field("address", &self.address)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .field("to", &self.to)
            .finish()
    }
}

impl EmailConfig {
    /// Build from any key lookup (environment, map, test fixture).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            address: lookup(ENV_ADDRESS),
            password: lookup(ENV_PASSWORD),
            smtp_server: lookup(ENV_SERVER),
            smtp_port: lookup(ENV_PORT),
            to: lookup(ENV_TO),
        }
    }

    /// Fill unset fields from `other`.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self {
            address: self.address.or(other.address),
            password: self.password.or(other.password),
            smtp_server: self.smtp_server.or(other.smtp_server),
            smtp_port: self.smtp_port.or(other.smtp_port),
            to: self.to.or(other.to),
        }
    }

    pub fn validate(&self) -> Result<SmtpSettings, NotifyError> {
        let address = required(self.address.as_deref(), "sender address")?;
        let password = required(self.password.as_deref(), "password")?;
        let host = required(self.smtp_server.as_deref(), "SMTP server")?;
        let port_text = required(self.smtp_port.as_deref(), "SMTP port")?;
        let to = required(self.to.as_deref(), "recipient address")?;

        let port = port_text
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| NotifyError::Config(format!("invalid SMTP port {port_text:?}")))?;

        let from = address
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::Config(format!("invalid sender address: {e}")))?;
        let to = to
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::Config(format!("invalid recipient address: {e}")))?;

        Ok(SmtpSettings {
            host: host.to_string(),
            port,
            credentials: Credentials::new(address.to_string(), password.to_string()),
            from,
            to,
        })
    }
}

fn required<'a>(value: Option<&'a str>, what: &str) -> Result<&'a str, NotifyError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(NotifyError::Config(format!("missing {what}"))),
    }
}

/// Validated SMTP settings for one delivery.
#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    credentials: Credentials,
    pub from: Mailbox,
    pub to: Mailbox,
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("credentials", &"<redacted>")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

impl SmtpSettings {
    pub fn build_message(&self, report: &str) -> Result<Message, NotifyError> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(REPORT_SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(report_body(report))
            .map_err(|e| NotifyError::Message(e.to_string()))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotifyError> {
        Ok(
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
                .map_err(|e| NotifyError::Config(format!("invalid SMTP server: {e}")))?
                .port(self.port)
                .credentials(self.credentials.clone())
                .timeout(Some(Duration::from_secs(SMTP_TIMEOUT_SECS)))
                .build(),
        )
    }
}

/// Sends reports as plain-text emails over SMTP with STARTTLS.
#[derive(Debug, Clone)]
pub struct EmailNotifier {
    config: EmailConfig,
}

impl EmailNotifier {
    #[must_use]
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &EmailConfig {
        &self.config
    }

    async fn deliver(&self, report: &str) -> Result<(), NotifyError> {
        let settings = self.config.validate()?;
        let email = settings.build_message(report)?;
        let transport = settings.transport()?;

        transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::info!(
            channel = "email",
            recipient = %settings.to,
            "Comparison report delivered"
        );
        Ok(())
    }
}

impl Notifier for EmailNotifier {
    fn send<'a>(&'a self, report: &'a str) -> NotifyFut<'a> {
        Box::pin(self.deliver(report))
    }

    fn channel_name(&self) -> &str {
        "email"
    }
}
