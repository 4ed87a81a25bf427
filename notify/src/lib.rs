//! Delivery of comparison reports.
//!
//! - [`Notifier`] - the seam the comparator depends on
//! - [`EmailNotifier`] - SMTP delivery via `lettre` (STARTTLS + login)
//!
//! Configuration problems are reported when a report is sent, never when a
//! notifier is constructed, so a pipeline can be built without credentials
//! and only the notification step fails.

mod email;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub use email::{EmailConfig, EmailNotifier, REPORT_SUBJECT, SmtpSettings, report_body};

/// Errors that can occur during notification delivery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("notifier configuration error: {0}")]
    Config(String),

    #[error("failed to build message: {0}")]
    Message(String),

    #[error("SMTP delivery failed: {0}")]
    Smtp(String),
}

pub type NotifyFut<'a> = Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>>;

/// A channel that delivers a finished report somewhere outside the process.
pub trait Notifier: Send + Sync {
    fn send<'a>(&'a self, report: &'a str) -> NotifyFut<'a>;

    /// Short name used in logs (`"email"`).
    fn channel_name(&self) -> &str;
}

impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    fn send<'a>(&'a self, report: &'a str) -> NotifyFut<'a> {
        (**self).send(report)
    }

    fn channel_name(&self) -> &str {
        (**self).channel_name()
    }
}

impl<T: Notifier + ?Sized> Notifier for &T {
    fn send<'a>(&'a self, report: &'a str) -> NotifyFut<'a> {
        (**self).send(report)
    }

    fn channel_name(&self) -> &str {
        (**self).channel_name()
    }
}
