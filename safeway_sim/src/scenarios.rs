//! Geofencing scenarios for deterministic runs.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SIM-001: Long stay in one qualifying cell
    Dwell,

    /// SIM-002: Leave and come back to the same cell
    ReEntry,

    /// SIM-003: Cross a strip of cells with rising and falling levels
    LevelHop,

    /// SIM-004: Notifications turned off
    Disabled,

    /// SIM-005: Settings screen changes the threshold mid-walk
    PreferenceFlip,

    /// SIM-006: Seeded random walk across a checkerboard
    RandomWalk,

    /// SIM-007: Grid with an overlapping cell
    Overlap,

    /// SIM-008: Location service toggled, notifications rejected by the sink
    Flaky,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Dwell,
            ScenarioId::ReEntry,
            ScenarioId::LevelHop,
            ScenarioId::Disabled,
            ScenarioId::PreferenceFlip,
            ScenarioId::RandomWalk,
            ScenarioId::Overlap,
            ScenarioId::Flaky,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Dwell => "dwell",
            ScenarioId::ReEntry => "re_entry",
            ScenarioId::LevelHop => "level_hop",
            ScenarioId::Disabled => "disabled",
            ScenarioId::PreferenceFlip => "preference_flip",
            ScenarioId::RandomWalk => "random_walk",
            ScenarioId::Overlap => "overlap",
            ScenarioId::Flaky => "flaky",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Dwell => "Stay inside one HIGH cell, expect exactly one alert",
            ScenarioId::ReEntry => "In, out, back in: expect exactly two alerts",
            ScenarioId::LevelHop => "Walk across cells of different levels without leaving the grid",
            ScenarioId::Disabled => "Random walk with notifications disabled, expect silence",
            ScenarioId::PreferenceFlip => "Threshold raised and lowered while inside a zone",
            ScenarioId::RandomWalk => "Seeded walk over a checkerboard, bucketed lookup vs reference",
            ScenarioId::Overlap => "Overlapping cells resolve to the first in load order",
            ScenarioId::Flaky => "Service toggles and failing delivery keep dedup state intact",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dwell" | "sim-001" => Ok(ScenarioId::Dwell),
            "re_entry" | "reentry" | "sim-002" => Ok(ScenarioId::ReEntry),
            "level_hop" | "levelhop" | "sim-003" => Ok(ScenarioId::LevelHop),
            "disabled" | "sim-004" => Ok(ScenarioId::Disabled),
            "preference_flip" | "preferenceflip" | "sim-005" => Ok(ScenarioId::PreferenceFlip),
            "random_walk" | "randomwalk" | "sim-006" => Ok(ScenarioId::RandomWalk),
            "overlap" | "sim-007" => Ok(ScenarioId::Overlap),
            "flaky" | "sim-008" => Ok(ScenarioId::Flaky),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
            assert!(!scenario.description().is_empty());
        }
        assert_eq!("SIM-002".parse::<ScenarioId>(), Ok(ScenarioId::ReEntry));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }
}
