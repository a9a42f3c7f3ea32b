//! Notification deduplication state machine.
//!
//! ```text
//!                 qualifying L (notify)
//!   NO_ACTIVE_ZONE ───────────────────────► ZONE_ACTIVE(L)
//!        ▲                                    │    │
//!        │   no zone / below threshold        │    │ qualifying L (suppress)
//!        └────────────────────────────────────┘    ▼
//!                                           ZONE_ACTIVE(L)
//!                qualifying M != L (notify) ──► ZONE_ACTIVE(M)
//! ```
//!
//! One notification per dwell: staying in zones of the same level is
//! silent, moving to a different qualifying level notifies immediately,
//! and leaving every qualifying zone re-arms the notifier.

use safeway_env::{Alert, RiskLevel, SessionId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::locator::ZoneMatch;
use crate::threshold::{NotificationPreference, ThresholdPolicy};

/// Outcome of a single transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Entered a qualifying zone of a new level: emit
    Notify(ZoneMatch),

    /// Still in a qualifying zone of the already-notified level
    Suppress(ZoneMatch),

    /// Left the last notified level for a non-qualifying position
    Reset,

    /// Not in a qualifying zone and nothing to clear
    Idle,
}

impl Decision {
    pub fn is_notify(&self) -> bool {
        matches!(self, Decision::Notify(_))
    }
}

/// Text of the alert handed to the sink.
///
/// `{label}` in either field is replaced by the level's display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertTemplate {
    pub title: String,
    pub body: String,
}

impl Default for AlertTemplate {
    fn default() -> Self {
        Self {
            title: "Área de risco".to_string(),
            body: "Você entrou em uma região de risco {label}.".to_string(),
        }
    }
}

impl AlertTemplate {
    /// Renders the alert for a zone.
    pub fn render(&self, session_id: SessionId, zone: ZoneMatch) -> Alert {
        let label = zone.level.label();
        Alert {
            session_id,
            level: zone.level,
            cell_id: zone.cell_id,
            title: self.title.replace("{label}", label),
            body: self.body.replace("{label}", label),
        }
    }
}

/// Decides whether each fix fires a notification.
///
/// Owned by exactly one session; never shared.
#[derive(Debug, Clone, Default)]
pub struct DedupNotifier {
    policy: ThresholdPolicy,
    last_notified: Option<RiskLevel>,
}

impl DedupNotifier {
    pub fn new(policy: ThresholdPolicy) -> Self {
        Self {
            policy,
            last_notified: None,
        }
    }

    /// Level of the current dwell, if a notification fired for it.
    pub fn last_notified(&self) -> Option<RiskLevel> {
        self.last_notified
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    /// Forgets the current dwell.
    pub fn reset(&mut self) {
        self.last_notified = None;
    }

    /// Advances the state machine for one fix.
    ///
    /// The state is updated before the caller delivers anything, so a
    /// failed delivery still counts as notified.
    pub fn transition(
        &mut self,
        located: Option<ZoneMatch>,
        preference: NotificationPreference,
    ) -> Decision {
        let qualifying =
            located.filter(|zone| self.policy.should_consider_notifying(preference, zone.level));

        match qualifying {
            None => {
                if self.last_notified.take().is_some() {
                    debug!("Left notifiable zone, dedup state cleared");
                    Decision::Reset
                } else {
                    Decision::Idle
                }
            }
            Some(zone) if self.last_notified == Some(zone.level) => Decision::Suppress(zone),
            Some(zone) => {
                self.last_notified = Some(zone.level);
                Decision::Notify(zone)
            }
        }
    }
}
