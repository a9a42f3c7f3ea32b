//! Notification delivery abstraction.

use crate::error::EnvError;
use crate::types::Alert;

/// Fire-and-forget delivery of alerts to the user.
///
/// The engine calls [`NotificationSink::emit`] exactly once per positive
/// decision. A returned error is logged by the caller and never undoes the
/// decision.
pub trait NotificationSink: Send + Sync {
    /// Delivers an alert.
    ///
    /// # Returns
    /// * `Ok(())` - Alert handed to the platform
    /// * `Err(EnvError::SinkError)` - Delivery failed (permission revoked, etc.)
    fn emit(&self, alert: &Alert) -> Result<(), EnvError>;
}

/// Production sink that writes alerts to the tracing log.
///
/// Stands in for the platform notification service on hosts without one.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn emit(&self, alert: &Alert) -> Result<(), EnvError> {
        tracing::info!(
            session = %alert.session_id,
            level = %alert.level,
            cell = alert.cell_id,
            "{}: {}",
            alert.title,
            alert.body
        );
        Ok(())
    }
}
