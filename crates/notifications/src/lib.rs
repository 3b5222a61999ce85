//! Domain notifications: business-rule outcomes raised during a unit of
//! work.
//!
//! Notifications are buffered by the in-process bus while an operation
//! runs, inspected for blocking severity at the commit decision, and
//! persisted through a two-phase recorder session only when the unit of
//! work commits. `query_by_key` is the read-only audit surface.

pub mod error;
pub mod memory;
pub mod notification;
pub mod recorder;

pub use error::{NotificationError, Result};
pub use memory::InMemoryNotificationRecorder;
pub use notification::{DomainNotification, Severity};
pub use recorder::{NotificationRecorder, NotificationSession};
