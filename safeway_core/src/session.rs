//! Geofence session: one user's stream of fixes against a shared grid.
//!
//! ```text
//!   fix ──► ZoneLocator ──► DedupNotifier ──► Decision
//!              │                 ▲               │
//!         Arc<RiskGrid>     preference      Notify ──► NotificationSink
//! ```

use safeway_env::{Coordinate, LocationFix, NotificationSink, PreferenceStore, RiskLevel, SessionId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::grid::RiskGrid;
use crate::locator::ZoneLocator;
use crate::notifier::{AlertTemplate, Decision, DedupNotifier};
use crate::threshold::{read_preference, NotificationPreference, ThresholdPolicy};

/// Counters kept by a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Fixes processed
    pub fixes: u64,

    /// Fixes that landed inside any cell, qualifying or not
    pub fixes_in_zone: u64,

    /// Alerts handed to the sink
    pub notifications: u64,

    /// Fixes silenced by deduplication
    pub suppressed: u64,

    /// Dwells ended by leaving every qualifying zone
    pub resets: u64,

    /// Alerts the sink rejected
    pub sink_failures: u64,
}

/// Per-user geofencing state.
///
/// Generic over the sink so the same session runs against the platform
/// notifier or a recording sink in the simulator.
pub struct GeofenceSession<Sink>
where
    Sink: NotificationSink,
{
    id: SessionId,
    grid: Arc<RiskGrid>,
    locator: ZoneLocator,
    notifier: DedupNotifier,
    preference: NotificationPreference,
    template: AlertTemplate,
    sink: Arc<Sink>,
    stats: SessionStats,
}

impl<Sink> GeofenceSession<Sink>
where
    Sink: NotificationSink,
{
    /// Creates a session with a fresh random id.
    pub fn new(
        grid: Arc<RiskGrid>,
        sink: Arc<Sink>,
        config: &EngineConfig,
        preference: NotificationPreference,
    ) -> Self {
        Self::with_id(SessionId::new(), grid, sink, config, preference)
    }

    /// Creates a session with a caller-chosen id.
    pub fn with_id(
        id: SessionId,
        grid: Arc<RiskGrid>,
        sink: Arc<Sink>,
        config: &EngineConfig,
        preference: NotificationPreference,
    ) -> Self {
        debug!(session = %id, cells = grid.len(), %preference, "Session created");
        Self {
            id,
            grid,
            locator: ZoneLocator::new(config.locate_strategy),
            notifier: DedupNotifier::new(ThresholdPolicy::new(config.threshold_table)),
            preference,
            template: config.alert_template.clone(),
            sink,
            stats: SessionStats::default(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn grid(&self) -> &Arc<RiskGrid> {
        &self.grid
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn preference(&self) -> NotificationPreference {
        self.preference
    }

    pub fn last_notified(&self) -> Option<RiskLevel> {
        self.notifier.last_notified()
    }

    /// Replaces the threshold used for subsequent fixes.
    ///
    /// The current dwell is kept: a preference change alone never fires.
    pub fn set_preference(&mut self, preference: NotificationPreference) {
        if preference != self.preference {
            info!(session = %self.id, from = %self.preference, to = %preference, "Notification preference changed");
            self.preference = preference;
        }
    }

    /// Re-reads the persisted preference.
    pub fn refresh_preference<S: PreferenceStore + ?Sized>(&mut self, store: &S) -> NotificationPreference {
        self.set_preference(read_preference(store));
        self.preference
    }

    /// Processes one position and delivers at most one alert.
    pub fn on_location_fix(&mut self, point: Coordinate) -> Decision {
        self.stats.fixes += 1;

        let located = self.locator.locate(point, &self.grid);
        if located.is_some() {
            self.stats.fixes_in_zone += 1;
        }

        let decision = self.notifier.transition(located, self.preference);
        match decision {
            Decision::Notify(zone) => {
                let alert = self.template.render(self.id, zone);
                info!(session = %self.id, cell = zone.cell_id, level = %zone.level, "Entered risk zone");
                if let Err(e) = self.sink.emit(&alert) {
                    warn!(session = %self.id, "Failed to deliver alert: {}", e);
                    self.stats.sink_failures += 1;
                }
                self.stats.notifications += 1;
            }
            Decision::Suppress(zone) => {
                debug!(session = %self.id, cell = zone.cell_id, level = %zone.level, "Still in notified zone");
                self.stats.suppressed += 1;
            }
            Decision::Reset => {
                debug!(session = %self.id, %point, "Left risk zone");
                self.stats.resets += 1;
            }
            Decision::Idle => {}
        }

        decision
    }

    /// Processes a timestamped fix.
    pub fn on_fix(&mut self, fix: &LocationFix) -> Decision {
        self.on_location_fix(fix.coordinate)
    }
}
