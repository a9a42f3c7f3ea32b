//! Scripted collaborators for deterministic runs.
//!
//! The scripted source plays the device: it replays fixes, toggles the
//! location service and, like the settings screen, writes the preference
//! store before announcing the change.

use async_trait::async_trait;
use safeway_env::{
    Alert, DeviceEvent, EnvError, LocationFix, LocationSource, NotificationSink, PreferenceStore,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// One step of a device script.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    /// Deliver a location fix
    Fix(LocationFix),

    /// Write the raw value to the preference store, then signal the change
    SetPreference(String),

    /// Location service switched on/off
    Services(bool),
}

/// Replays a fixed script of device events.
pub struct ScriptedLocationSource {
    steps: Mutex<VecDeque<ScriptStep>>,
    store: Arc<dyn PreferenceStore>,
    preference_key: String,
}

impl ScriptedLocationSource {
    pub fn new(
        steps: impl IntoIterator<Item = ScriptStep>,
        store: Arc<dyn PreferenceStore>,
        preference_key: &str,
    ) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            store,
            preference_key: preference_key.to_string(),
        }
    }

    /// Steps not yet delivered.
    pub fn remaining(&self) -> usize {
        self.steps.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn pop(&self) -> Option<ScriptStep> {
        self.steps.lock().ok()?.pop_front()
    }
}

#[async_trait]
impl LocationSource for ScriptedLocationSource {
    async fn next_event(&self) -> Option<DeviceEvent> {
        let event = match self.pop()? {
            ScriptStep::Fix(fix) => DeviceEvent::Fix(fix),
            ScriptStep::SetPreference(raw) => {
                if let Err(e) = self.store.set(&self.preference_key, &raw) {
                    warn!("Scripted preference write failed: {}", e);
                }
                DeviceEvent::PreferencesChanged
            }
            ScriptStep::Services(enabled) => DeviceEvent::ServicesChanged(enabled),
        };
        // Let other tasks observe each step, as a real device stream would
        tokio::task::yield_now().await;
        Some(event)
    }
}

/// Sink that keeps every alert it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    alerts: Mutex<Vec<Alert>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that rejects every alert (still recording the attempt).
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.failing.store(true, Ordering::SeqCst);
        sink
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of alerts in delivery order.
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationSink for RecordingSink {
    fn emit(&self, alert: &Alert) -> Result<(), EnvError> {
        debug!(level = %alert.level, cell = alert.cell_id, "Recorded alert");
        self.alerts
            .lock()
            .map_err(|_| EnvError::sink("Recording sink poisoned"))?
            .push(alert.clone());

        if self.failing.load(Ordering::SeqCst) {
            return Err(EnvError::sink("Scripted delivery failure"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safeway_env::{Coordinate, MemoryPreferenceStore, RiskLevel, SessionId};

    #[tokio::test]
    async fn test_script_replays_in_order() {
        let store: Arc<dyn PreferenceStore> = Arc::new(MemoryPreferenceStore::new());
        let fix = LocationFix::new(Coordinate::new(1.0, 1.0), 1);
        let source = ScriptedLocationSource::new(
            vec![
                ScriptStep::Fix(fix),
                ScriptStep::Services(false),
                ScriptStep::SetPreference("high".to_string()),
            ],
            store.clone(),
            "notificationLevel",
        );
        assert_eq!(source.remaining(), 3);

        assert_eq!(source.next_event().await, Some(DeviceEvent::Fix(fix)));
        assert_eq!(source.next_event().await, Some(DeviceEvent::ServicesChanged(false)));
        assert_eq!(store.get("notificationLevel").unwrap(), None);
        assert_eq!(source.next_event().await, Some(DeviceEvent::PreferencesChanged));
        assert_eq!(store.get("notificationLevel").unwrap().as_deref(), Some("high"));
        assert_eq!(source.next_event().await, None);
    }

    #[test]
    fn test_recording_sink_failing_mode() {
        let sink = RecordingSink::failing();
        let alert = Alert {
            session_id: SessionId::from_seed(0),
            level: RiskLevel::High,
            cell_id: 2,
            title: "t".to_string(),
            body: "b".to_string(),
        };

        assert!(sink.emit(&alert).is_err());
        assert_eq!(sink.len(), 1);

        sink.set_failing(false);
        assert!(sink.emit(&alert).is_ok());
        assert_eq!(sink.alerts().len(), 2);
    }
}
