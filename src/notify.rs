//! Fire-and-forget channel for user-visible notices.
//!
//! Not part of the reconciliation logic itself; the presentation layer
//! decides how a [`Notice`] is rendered and dismissed.

#[cfg(test)]
#[path = "notify_test.rs"]
mod notify_test;

use std::time::Duration;

/// How loudly a notice should be presented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Success,
    Warning,
    Error,
}

/// A transient user-visible notice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub severity: Severity,
    pub message: String,
    /// How long the presentation layer should keep the notice visible.
    pub auto_dismiss: Duration,
}

impl Notice {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Success,
            message: message.into(),
            auto_dismiss: Duration::from_secs(4),
        }
    }

    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            auto_dismiss: Duration::from_secs(6),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            auto_dismiss: Duration::from_secs(8),
        }
    }
}

/// Sink the core pushes notices into.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Sink that forwards notices to the tracing log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, notice: Notice) {
        match notice.severity {
            Severity::Success => tracing::info!(message = %notice.message, "notice"),
            Severity::Warning => tracing::warn!(message = %notice.message, "notice"),
            Severity::Error => tracing::error!(message = %notice.message, "notice"),
        }
    }
}
