//! Scenario runner - executes geofencing scenarios against the Oracle.
//!
//! Every scenario is a device script replayed through the real
//! [`SessionRuntime`]. The alerts that reach the sink are compared with the
//! Oracle's expectation, then scenario-specific assertions run on top.

use crate::devices::{RecordingSink, ScriptStep, ScriptedLocationSource};
use crate::oracle::{ExpectedFix, Oracle};
use crate::scenarios::ScenarioId;
use crate::walker::{offset, scripted_track, RandomWalk, WalkConfig};
use crate::world::{SimWorld, WorldConfig};

use safeway_core::{
    read_preference, EngineConfig, GeofenceSession, LocateStrategy, RiskGrid, SessionRuntime,
    SessionStats, ThresholdPolicy, ZoneLocator, PREFERENCE_KEY,
};
use safeway_env::{
    Alert, ChannelLocationSource, Coordinate, LocationFix, MemoryPreferenceStore, PreferenceStore,
    RiskLevel, SessionId,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Interval between scripted fixes (milliseconds).
const FIX_INTERVAL_MS: u64 = 2_000;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,

    /// Oracle expectation per fix
    pub expected: Vec<ExpectedFix>,

    /// Alerts that reached the sink, in order
    pub alerts: Vec<Alert>,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMetrics {
    /// Session counters at the end of the run
    pub stats: SessionStats,

    /// Notifications the Oracle expected
    pub expected_notifications: u64,

    /// Cells in the scenario grid
    pub cells: usize,

    /// Cell pairs with overlapping bounding boxes
    pub overlapping_pairs: usize,
}

/// Everything a scenario needs to run.
struct Plan {
    grid: RiskGrid,
    config: EngineConfig,
    initial_preference: Option<String>,
    steps: Vec<ScriptStep>,
    sink: RecordingSink,
    check: fn(&Outcome) -> Result<(), String>,
}

/// What a run produced.
struct Outcome {
    grid: Arc<RiskGrid>,
    stats: SessionStats,
    expected: Vec<ExpectedFix>,
    alerts: Vec<Alert>,
}

impl Outcome {
    fn expected_notifications(&self) -> u64 {
        self.expected.iter().filter(|e| e.notify).count() as u64
    }
}

/// Runs geofencing scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Fixes generated by walk-based scenarios
    walk_fixes: usize,

    /// Engine configuration shared by every scenario
    config: EngineConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            walk_fixes: 200,
            config: EngineConfig::default(),
        }
    }

    /// Sets the number of fixes for walk-based scenarios.
    pub fn with_fixes(mut self, fixes: usize) -> Self {
        self.walk_fixes = fixes.max(1);
        self
    }

    /// Sets the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs a scenario and returns the result.
    pub async fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let plan = match scenario {
            ScenarioId::Dwell => self.plan_dwell(),
            ScenarioId::ReEntry => self.plan_re_entry(),
            ScenarioId::LevelHop => self.plan_level_hop(),
            ScenarioId::Disabled => self.plan_disabled(),
            ScenarioId::PreferenceFlip => self.plan_preference_flip(),
            ScenarioId::RandomWalk => self.plan_random_walk(),
            ScenarioId::Overlap => self.plan_overlap(),
            ScenarioId::Flaky => self.plan_flaky(),
        };

        let check = plan.check;
        let outcome = self.execute(plan).await;

        let verdict = verify_against_oracle(&outcome).and_then(|()| check(&outcome));
        if let Err(reason) = &verdict {
            warn!("Scenario {} failed: {}", scenario.name(), reason);
        }

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: verdict.is_ok(),
            failure_reason: verdict.err(),
            metrics: ScenarioMetrics {
                stats: outcome.stats,
                expected_notifications: outcome.expected_notifications(),
                cells: outcome.grid.len(),
                overlapping_pairs: outcome.grid.overlapping_pairs().len(),
            },
            expected: outcome.expected,
            alerts: outcome.alerts,
        }
    }

    async fn execute(&self, plan: Plan) -> Outcome {
        let grid = match plan.config.locate_strategy {
            LocateStrategy::Bucketed => plan.grid.with_bucket_index(plan.config.bucket_size_deg),
            _ => plan.grid,
        };
        let grid = Arc::new(grid);

        let store: Arc<dyn PreferenceStore> = Arc::new(MemoryPreferenceStore::new());
        if let Some(raw) = &plan.initial_preference {
            if let Err(e) = store.set(PREFERENCE_KEY, raw) {
                warn!("Failed to seed preference: {}", e);
            }
        }

        let sink = Arc::new(plan.sink);
        let source = Arc::new(ScriptedLocationSource::new(
            plan.steps.clone(),
            store.clone(),
            PREFERENCE_KEY,
        ));

        let session = GeofenceSession::with_id(
            SessionId::from_seed(self.seed),
            grid.clone(),
            sink.clone(),
            &plan.config,
            read_preference(store.as_ref()),
        );
        let stats = SessionRuntime::from_session(source, store, session).run().await;

        let oracle = Oracle::new(&grid, ThresholdPolicy::new(plan.config.threshold_table));
        let expected = oracle.expected(plan.initial_preference.as_deref(), &plan.steps);
        debug!(
            "Oracle expects {} notifications over {} fixes",
            expected.iter().filter(|e| e.notify).count(),
            expected.len()
        );

        Outcome {
            grid,
            stats,
            expected,
            alerts: sink.alerts(),
        }
    }

    // ========================================================================
    // SCENARIO PLANS
    // ========================================================================

    fn world_seed(&self) -> u64 {
        self.seed.wrapping_mul(0x9e3779b97f4a7c15)
    }

    /// SIM-001: jittered fixes around the centre of one HIGH cell.
    fn plan_dwell(&self) -> Plan {
        let world = SimWorld::strip(WorldConfig::default(), &[1200]);
        let mut jitter = RandomWalk::new(
            self.world_seed(),
            world.cell_center(0, 0),
            WalkConfig {
                step_m: 0.0,
                heading_std: 0.0,
                jitter_std_m: 20.0,
                interval_ms: FIX_INTERVAL_MS,
            },
        );

        let mut steps = fixes_at(&[world.outside()]);
        steps.extend(jitter.take_fixes(self.walk_fixes).into_iter().map(ScriptStep::Fix));

        Plan {
            grid: world.grid,
            config: self.config.clone(),
            initial_preference: Some("high".to_string()),
            steps,
            sink: RecordingSink::new(),
            check: |outcome| {
                expect_eq("notifications", outcome.stats.notifications, 1)?;
                expect_eq("suppressed", outcome.stats.suppressed, outcome.stats.fixes - 2)
            },
        }
    }

    /// SIM-002: inside, outside, inside again.
    fn plan_re_entry(&self) -> Plan {
        let world = SimWorld::strip(WorldConfig::default(), &[1200]);
        let inside = world.cell_center(0, 0);
        let outside = world.outside();

        let mut waypoints = vec![inside; 5];
        waypoints.extend([outside; 3]);
        waypoints.extend([inside; 5]);

        Plan {
            grid: world.grid,
            config: self.config.clone(),
            initial_preference: Some("moderate".to_string()),
            steps: fixes_at(&waypoints),
            sink: RecordingSink::new(),
            check: |outcome| {
                expect_eq("notifications", outcome.stats.notifications, 2)?;
                expect_eq("resets", outcome.stats.resets, 1)
            },
        }
    }

    /// SIM-003: Moderate, High, VeryHigh, High, Low, Moderate side by side.
    fn plan_level_hop(&self) -> Plan {
        let world = SimWorld::strip(WorldConfig::default(), &[600, 1200, 2000, 1200, 300, 600]);
        let waypoints: Vec<Coordinate> = (0..world.config.cols)
            .flat_map(|col| [world.cell_center(0, col); 3])
            .collect();

        Plan {
            grid: world.grid,
            config: self.config.clone(),
            initial_preference: Some("moderate".to_string()),
            steps: fixes_at(&waypoints),
            sink: RecordingSink::new(),
            check: |outcome| {
                let levels: Vec<RiskLevel> = outcome.alerts.iter().map(|a| a.level).collect();
                let expected = vec![
                    RiskLevel::Moderate,
                    RiskLevel::High,
                    RiskLevel::VeryHigh,
                    RiskLevel::High,
                    RiskLevel::Moderate,
                ];
                if levels != expected {
                    return Err(format!("alert levels {:?}, expected {:?}", levels, expected));
                }
                expect_eq("resets", outcome.stats.resets, 1)
            },
        }
    }

    /// SIM-004: random walk with notifications disabled.
    fn plan_disabled(&self) -> Plan {
        let world = self.checkerboard(false);
        let steps = self.walk_steps(&world);

        Plan {
            grid: world.grid,
            config: self.config.clone(),
            initial_preference: Some("none".to_string()),
            steps,
            sink: RecordingSink::new(),
            check: |outcome| {
                expect_eq("notifications", outcome.stats.notifications, 0)?;
                if outcome.stats.fixes_in_zone == 0 {
                    return Err("walk never entered the grid".to_string());
                }
                Ok(())
            },
        }
    }

    /// SIM-005: threshold raised above the zone's level and lowered again.
    fn plan_preference_flip(&self) -> Plan {
        let world = SimWorld::strip(WorldConfig::default(), &[1200]);
        let inside = world.cell_center(0, 0);

        let mut steps = fixes_at(&[inside; 3]);
        steps.push(ScriptStep::SetPreference("very-high".to_string()));
        steps.extend(fixes_at(&[inside; 3]));
        steps.push(ScriptStep::SetPreference("HIGH".to_string()));
        steps.extend(fixes_at(&[inside; 3]));

        Plan {
            grid: world.grid,
            config: self.config.clone(),
            initial_preference: None,
            steps,
            sink: RecordingSink::new(),
            check: |outcome| {
                expect_eq("notifications", outcome.stats.notifications, 2)?;
                let indices: Vec<usize> =
                    outcome.expected.iter().filter(|e| e.notify).map(|e| e.index).collect();
                if indices != vec![0, 6] {
                    return Err(format!("notified at fixes {:?}, expected [0, 6]", indices));
                }
                Ok(())
            },
        }
    }

    /// SIM-006: checkerboard walk with the bucketed locator.
    fn plan_random_walk(&self) -> Plan {
        let world = self.checkerboard(false);
        let steps = self.walk_steps(&world);

        let config = EngineConfig {
            locate_strategy: LocateStrategy::Bucketed,
            bucket_size_deg: world.config.cell_size_deg / 2.0,
            ..self.config.clone()
        };

        Plan {
            grid: world.grid,
            config,
            initial_preference: Some("low".to_string()),
            steps,
            sink: RecordingSink::new(),
            check: |outcome| {
                if outcome.grid.bucket_index().is_none() {
                    return Err("bucket index was not built".to_string());
                }
                Ok(())
            },
        }
    }

    /// SIM-007: fixes inside both cell 0 and the overlapping cell.
    fn plan_overlap(&self) -> Plan {
        let world = self.checkerboard(true);
        let size_m = world.config.cell_size_deg * 111_320.0;
        let shared = offset(world.cell_center(0, 0), size_m * 0.3, size_m * 0.3);

        let mut waypoints = vec![shared; 4];
        waypoints.push(world.outside());
        waypoints.extend([shared; 2]);

        Plan {
            grid: world.grid,
            config: self.config.clone(),
            initial_preference: Some("very-low".to_string()),
            steps: fixes_at(&waypoints),
            sink: RecordingSink::new(),
            check: |outcome| {
                if outcome.grid.overlapping_pairs().is_empty() {
                    return Err("audit found no overlapping cells".to_string());
                }
                let locator = ZoneLocator::default();
                let shallow: Vec<usize> = outcome
                    .expected
                    .iter()
                    .filter(|e| e.cell_id.is_some())
                    .filter(|e| {
                        let all = locator.locate_all(e.fix.coordinate, &outcome.grid);
                        all.len() < 2 || all.first() != e.cell_id.as_ref()
                    })
                    .map(|e| e.index)
                    .collect();
                if !shallow.is_empty() {
                    return Err(format!("fixes {:?} not inside overlapping cells", shallow));
                }
                let wrong: Vec<usize> = outcome
                    .expected
                    .iter()
                    .filter(|e| e.cell_id.is_some() && e.cell_id != Some(0))
                    .map(|e| e.index)
                    .collect();
                if !wrong.is_empty() {
                    return Err(format!("fixes {:?} did not resolve to cell 0", wrong));
                }
                if outcome.alerts.iter().any(|a| a.cell_id != 0) {
                    return Err("alert raised for a later overlapping cell".to_string());
                }
                Ok(())
            },
        }
    }

    /// SIM-008: service toggles around the walk and a sink that always fails.
    fn plan_flaky(&self) -> Plan {
        let world = SimWorld::strip(WorldConfig::default(), &[1200, 300]);
        let inside = world.cell_center(0, 0);

        let mut steps = vec![ScriptStep::Services(false)];
        steps.extend(fixes_at(&[inside; 3]));
        steps.push(ScriptStep::Services(true));
        steps.extend(fixes_at(&[world.outside(), inside, inside]));

        Plan {
            grid: world.grid,
            config: self.config.clone(),
            initial_preference: Some("high".to_string()),
            steps,
            sink: RecordingSink::failing(),
            check: |outcome| {
                expect_eq("notifications", outcome.stats.notifications, 2)?;
                expect_eq("sink failures", outcome.stats.sink_failures, 2)?;
                expect_eq("suppressed", outcome.stats.suppressed, 3)
            },
        }
    }

    fn checkerboard(&self, with_overlap: bool) -> SimWorld {
        SimWorld::new(WorldConfig {
            seed: self.world_seed(),
            with_overlap,
            ..WorldConfig::default()
        })
    }

    /// Random walk starting at the middle of the world.
    fn walk_steps(&self, world: &SimWorld) -> Vec<ScriptStep> {
        let start = world.cell_center(world.config.rows / 2, world.config.cols / 2);
        RandomWalk::new(self.seed, start, WalkConfig::default())
            .take_fixes(self.walk_fixes)
            .into_iter()
            .map(ScriptStep::Fix)
            .collect()
    }
}

/// Compares what the engine did with what the Oracle expects.
fn verify_against_oracle(outcome: &Outcome) -> Result<(), String> {
    expect_eq("fixes", outcome.stats.fixes, outcome.expected.len() as u64)?;

    let expected: Vec<(usize, RiskLevel)> = outcome
        .expected
        .iter()
        .filter(|e| e.notify)
        .filter_map(|e| Some((e.cell_id?, e.level?)))
        .collect();
    let actual: Vec<(usize, RiskLevel)> = outcome.alerts.iter().map(|a| (a.cell_id, a.level)).collect();

    if expected != actual {
        return Err(format!(
            "alerts diverge from oracle: expected {:?}, got {:?}",
            expected, actual
        ));
    }
    Ok(())
}

fn expect_eq(what: &str, actual: u64, expected: u64) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("{}: expected {}, got {}", what, expected, actual))
    }
}

fn fixes_at(waypoints: &[Coordinate]) -> Vec<ScriptStep> {
    scripted_track(waypoints, FIX_INTERVAL_MS)
        .into_iter()
        .map(ScriptStep::Fix)
        .collect()
}

// ============================================================================
// REPLAY
// ============================================================================

/// Result of replaying a recorded track.
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub stats: SessionStats,
    pub alerts: Vec<Alert>,
}

/// Replays recorded fixes through the production channel source.
///
/// The track is fed from a separate task, the way the platform layer pushes
/// fixes, and the session ends when the track is exhausted.
pub async fn replay<Store>(
    grid: Arc<RiskGrid>,
    config: &EngineConfig,
    store: Arc<Store>,
    fixes: Vec<LocationFix>,
) -> ReplayOutcome
where
    Store: PreferenceStore + ?Sized + 'static,
{
    let (tx, source) = ChannelLocationSource::channel(64);
    let sink = Arc::new(RecordingSink::new());
    let runtime = SessionRuntime::new(Arc::new(source), sink.clone(), store, grid, config);

    let feeder = tokio::spawn(async move {
        for fix in fixes {
            if tx.send_fix(fix).await.is_err() {
                break;
            }
        }
    });

    let stats = runtime.run().await;
    if let Err(e) = feeder.await {
        warn!("Track feeder stopped abnormally: {}", e);
    }

    ReplayOutcome {
        stats,
        alerts: sink.alerts(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_all_scenarios_pass_default_seed() {
        let runner = ScenarioRunner::new(42);
        for scenario in ScenarioId::all() {
            let result = runner.run(scenario).await;
            assert!(
                result.passed,
                "{} failed: {:?}",
                scenario,
                result.failure_reason
            );
        }
    }

    #[tokio::test]
    async fn test_random_walk_passes_across_seeds() {
        for seed in 0..8 {
            let result = ScenarioRunner::new(seed)
                .with_fixes(150)
                .run(ScenarioId::RandomWalk)
                .await;
            assert!(result.passed, "seed {}: {:?}", seed, result.failure_reason);
            assert_eq!(result.metrics.stats.fixes, 150);
        }
    }

    #[tokio::test]
    async fn test_scenarios_pass_with_exhaustive_locator() {
        let config = EngineConfig {
            locate_strategy: LocateStrategy::Exhaustive,
            ..EngineConfig::default()
        };
        let runner = ScenarioRunner::new(7).with_config(config);
        for scenario in [ScenarioId::Overlap, ScenarioId::LevelHop, ScenarioId::Disabled] {
            let result = runner.run(scenario).await;
            assert!(result.passed, "{}: {:?}", scenario, result.failure_reason);
        }
    }

    #[tokio::test]
    async fn test_result_is_deterministic() {
        let a = ScenarioRunner::new(3).run(ScenarioId::RandomWalk).await;
        let b = ScenarioRunner::new(3).run(ScenarioId::RandomWalk).await;
        assert_eq!(a.alerts, b.alerts);
        assert_eq!(a.expected, b.expected);
    }

    #[tokio::test]
    async fn test_replay_through_channel() {
        let ring = vec![
            Coordinate::from_lon_lat(0.0, 0.0),
            Coordinate::from_lon_lat(0.0, 1.0),
            Coordinate::from_lon_lat(1.0, 1.0),
            Coordinate::from_lon_lat(1.0, 0.0),
        ];
        let grid = Arc::new(RiskGrid::from_parts(vec![(ring, 1200)]));
        let store = Arc::new(MemoryPreferenceStore::with_value(PREFERENCE_KEY, "high"));
        let fixes = scripted_track(
            &[
                Coordinate::new(0.5, 0.5),
                Coordinate::new(0.5, 0.5),
                Coordinate::new(5.0, 5.0),
                Coordinate::new(0.5, 0.5),
            ],
            1_000,
        );

        let outcome = replay(grid, &EngineConfig::default(), store, fixes).await;
        assert_eq!(outcome.stats.fixes, 4);
        assert_eq!(outcome.alerts.len(), 2);
    }
}
