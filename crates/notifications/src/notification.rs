use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a domain notification.
///
/// `Error` is the blocking level: a unit of work that collected an
/// error-severity notification must not commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Informational outcome, no action required.
    Information,

    /// Suspicious but non-blocking outcome.
    Warning,

    /// Business-rule violation; blocks the surrounding unit of work.
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Information => write!(f, "information"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// An immutable business-rule outcome raised during a unit of work.
///
/// Notifications are buffered while the operation runs and persisted only
/// if the unit of work commits; an error-severity notification prevents
/// that commit altogether.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainNotification {
    /// Logical subsystem or aggregate name the notification belongs to.
    pub domain: String,

    /// Correlates to the originating aggregate or operation.
    pub key: String,

    /// Human-readable description of the outcome.
    pub message: String,

    /// Severity of the outcome.
    pub severity: Severity,

    /// When the notification was raised.
    pub occurred_at: DateTime<Utc>,
}

impl DomainNotification {
    /// Creates a notification with the given severity.
    pub fn new(
        domain: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            domain: domain.into(),
            key: key.into(),
            message: message.into(),
            severity,
            occurred_at: Utc::now(),
        }
    }

    /// Creates an information-severity notification.
    pub fn info(
        domain: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(domain, key, message, Severity::Information)
    }

    /// Creates a warning-severity notification.
    pub fn warning(
        domain: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(domain, key, message, Severity::Warning)
    }

    /// Creates an error-severity notification.
    pub fn error(
        domain: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(domain, key, message, Severity::Error)
    }

    /// Returns true if this notification blocks the surrounding unit of
    /// work from committing.
    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Error
    }
}
