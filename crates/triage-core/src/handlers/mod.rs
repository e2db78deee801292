//! Per-type task handlers.
//!
//! The three analysis kinds share one implementation and differ only in the
//! endpoint they call. Notifications stay in-process.

mod analysis;
mod notification;

pub use analysis::{AnalysisHandler, is_high_priority};
pub use notification::{Notification, NotificationHandler, Notifier};
