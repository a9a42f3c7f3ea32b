//! Reference model for simulation runs.
//!
//! The Oracle computes, for a device script, which fixes must notify. It is
//! deliberately naive: every cell is ray-cast in load order for every fix
//! and the dedup rule is written out directly, so it shares nothing with the
//! engine but the geometric predicate and the threshold table.

use safeway_core::{contains, NotificationPreference, RiskGrid, ThresholdPolicy};
use safeway_env::{RiskLevel, LocationFix};
use serde::{Deserialize, Serialize};

use crate::devices::ScriptStep;

/// Expected outcome for one fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedFix {
    /// Position of the fix in the script's fix sequence
    pub index: usize,

    pub fix: LocationFix,

    /// First containing cell in load order
    pub cell_id: Option<usize>,

    pub level: Option<RiskLevel>,

    /// Preference in force when the fix was processed
    pub preference: NotificationPreference,

    /// Whether the engine must notify for this fix
    pub notify: bool,
}

/// Ground truth for a scripted run.
pub struct Oracle<'g> {
    grid: &'g RiskGrid,
    policy: ThresholdPolicy,
}

impl<'g> Oracle<'g> {
    pub fn new(grid: &'g RiskGrid, policy: ThresholdPolicy) -> Self {
        Self { grid, policy }
    }

    /// First cell containing the fix, scanning every cell.
    pub fn containing_cell(&self, fix: &LocationFix) -> Option<(usize, RiskLevel)> {
        self.grid
            .cells()
            .iter()
            .find(|cell| contains(fix.coordinate, &cell.ring))
            .map(|cell| (cell.id, cell.level))
    }

    /// Expected outcome of every fix in the script.
    ///
    /// `initial` is the raw stored preference at session start, `None` if
    /// the key was never written.
    pub fn expected(&self, initial: Option<&str>, steps: &[ScriptStep]) -> Vec<ExpectedFix> {
        let mut preference = parse_or_default(initial);
        let mut last_notified: Option<RiskLevel> = None;
        let mut expected = Vec::new();

        for step in steps {
            match step {
                ScriptStep::SetPreference(raw) => preference = parse_or_default(Some(raw)),
                ScriptStep::Services(_) => {}
                ScriptStep::Fix(fix) => {
                    let hit = self.containing_cell(fix);
                    let qualifying = hit
                        .map(|(_, level)| level)
                        .filter(|level| self.policy.should_consider_notifying(preference, *level));

                    let notify = match qualifying {
                        Some(level) if last_notified != Some(level) => {
                            last_notified = Some(level);
                            true
                        }
                        Some(_) => false,
                        None => {
                            last_notified = None;
                            false
                        }
                    };

                    expected.push(ExpectedFix {
                        index: expected.len(),
                        fix: *fix,
                        cell_id: hit.map(|(id, _)| id),
                        level: hit.map(|(_, level)| level),
                        preference,
                        notify,
                    });
                }
            }
        }

        expected
    }
}

fn parse_or_default(raw: Option<&str>) -> NotificationPreference {
    raw.and_then(|r| r.parse().ok()).unwrap_or_default()
}
