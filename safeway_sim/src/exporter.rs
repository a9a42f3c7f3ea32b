//! JSON exporter for scenario traces.
//!
//! Writes one document per run: every fix with the Oracle's verdict, and
//! every alert the engine actually emitted.

use safeway_core::{NotificationPreference, SessionStats};
use safeway_env::{Alert, RiskLevel};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

use crate::runner::ScenarioResult;

/// A single fix of the trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceFrame {
    pub index: usize,
    pub timestamp_ms: u64,
    pub latitude: f64,
    pub longitude: f64,

    /// Cell the fix fell in, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_id: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<RiskLevel>,

    pub preference: NotificationPreference,

    /// Oracle verdict
    pub notify: bool,
}

/// Complete scenario export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Session counters
    pub stats: SessionStats,

    /// All fixes
    pub frames: Vec<TraceFrame>,

    /// Alerts delivered to the sink
    pub alerts: Vec<Alert>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            passed: false,
            failure_reason: None,
            stats: SessionStats::default(),
            frames: Vec::new(),
            alerts: Vec::new(),
        }
    }

    /// Builds the export of a finished run.
    pub fn from_result(result: &ScenarioResult) -> Self {
        let mut export = Self::new(result.scenario.name(), result.seed);
        export.frames = result
            .expected
            .iter()
            .map(|e| TraceFrame {
                index: e.index,
                timestamp_ms: e.fix.timestamp_ms,
                latitude: e.fix.coordinate.latitude,
                longitude: e.fix.coordinate.longitude,
                cell_id: e.cell_id,
                level: e.level,
                preference: e.preference,
                notify: e.notify,
            })
            .collect();
        export.alerts = result.alerts.clone();
        export.finalize(result.passed, result.failure_reason.clone(), result.metrics.stats);
        export
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: TraceFrame) {
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>, stats: SessionStats) {
        self.passed = passed;
        self.failure_reason = failure_reason;
        self.stats = stats;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
