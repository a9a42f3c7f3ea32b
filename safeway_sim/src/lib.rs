//! SafeWay Deterministic Simulation Harness
//!
//! Runs the geofencing engine against scripted devices where every input is
//! derived from a single 64-bit seed:
//! - **Grids**: synthetic checkerboards and strips with known levels
//! - **Tracks**: seeded random walks with GPS jitter, or fixed waypoints
//! - **Device**: scripted location source, preference writes, service toggles
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                        │
//! │                                                           │
//! │  SimWorld ──► RiskGrid ──────────────┐                    │
//! │                                      ▼                    │
//! │  RandomWalk ──► ScriptedLocationSource ──► SessionRuntime │
//! │                                      │          │         │
//! │                                      │    RecordingSink   │
//! │                                      ▼          │         │
//! │                                   Oracle ◄──compare       │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use safeway_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::ReEntry).await;
//! assert!(result.passed);
//! ```

mod devices;
mod exporter;
mod oracle;
mod runner;
mod walker;
mod world;
pub mod scenarios;

pub use devices::{RecordingSink, ScriptStep, ScriptedLocationSource};
pub use exporter::{SimExport, TraceFrame};
pub use oracle::{ExpectedFix, Oracle};
pub use runner::{replay, ReplayOutcome, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use walker::{offset, scripted_track, RandomWalk, WalkConfig};
pub use world::{SimWorld, WorldConfig};
