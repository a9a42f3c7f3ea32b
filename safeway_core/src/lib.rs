//! SafeWay Core - Risk-zone geofencing engine
//!
//! Turns a stream of position fixes into at most one alert per stay inside a
//! risk zone:
//! 1. **Classification**: historical incident counts become risk levels
//! 2. **Containment**: each fix is matched to the first risk cell containing it
//! 3. **Deduplication**: a per-session state machine fires once per dwell,
//!    gated by the user's notification threshold
//!
//! The computation is synchronous and Sans-IO; device access goes through the
//! traits in `safeway_env`, and [`session_runtime::SessionRuntime`] is the
//! only async piece.

pub mod classifier;
pub mod config;
pub mod geometry;
pub mod grid;
pub mod locator;
pub mod notifier;
pub mod session;
pub mod session_runtime;
pub mod threshold;

// Re-export key types for convenience
pub use classifier::{classify, RiskTiers};
pub use config::{ConfigError, EngineConfig};
pub use geometry::{contains, BoundingBox};
pub use grid::{BucketIndex, GridError, GridLoader, LoadReport, MalformedCell, RiskCell, RiskGrid};
pub use locator::{locate, LocateStrategy, ZoneLocator, ZoneMatch};
pub use notifier::{AlertTemplate, Decision, DedupNotifier};
pub use session::{GeofenceSession, SessionStats};
pub use session_runtime::SessionRuntime;
pub use threshold::{
    minimum_ordinal, read_preference, should_consider_notifying, write_preference,
    NotificationPreference, ThresholdPolicy, ThresholdTable, PREFERENCE_KEY,
};
