//! Common types for the SafeWay environment abstraction.
//!
//! These are the values that cross the boundary between the engine and the
//! device layer: positions coming in, alerts going out.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A WGS84 position in decimal degrees.
///
/// No range validation is performed on construction. Out-of-range values are
/// carried as-is and simply never fall inside a real risk cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate from latitude/longitude degrees.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Creates a coordinate from GeoJSON axis order (`[lon, lat]`).
    pub const fn from_lon_lat(longitude: f64, latitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Returns true if both axes are finite and inside the WGS84 ranges.
    ///
    /// Diagnostic only; the engine accepts any value.
    pub fn is_in_range(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// A single position report from the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    /// Reported position
    pub coordinate: Coordinate,

    /// Device timestamp (Unix milliseconds)
    pub timestamp_ms: u64,

    /// Horizontal accuracy radius in meters, when the platform provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
}

impl LocationFix {
    /// Creates a fix without accuracy information.
    pub fn new(coordinate: Coordinate, timestamp_ms: u64) -> Self {
        Self {
            coordinate,
            timestamp_ms,
            accuracy_m: None,
        }
    }
}

/// Ordinal risk classification, ascending severity.
///
/// The derived ordering follows declaration order, which matches the ordinal
/// returned by [`RiskLevel::ordinal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskLevel {
    None,
    VeryLow,
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl RiskLevel {
    /// Highest ordinal any level can have.
    pub const MAX_ORDINAL: i32 = 4;

    /// All levels in ascending severity.
    pub fn all() -> [RiskLevel; 6] {
        [
            RiskLevel::None,
            RiskLevel::VeryLow,
            RiskLevel::Low,
            RiskLevel::Moderate,
            RiskLevel::High,
            RiskLevel::VeryHigh,
        ]
    }

    /// Severity ordinal: `None` is -1, `VeryHigh` is 4.
    pub fn ordinal(&self) -> i32 {
        match self {
            RiskLevel::None => -1,
            RiskLevel::VeryLow => 0,
            RiskLevel::Low => 1,
            RiskLevel::Moderate => 2,
            RiskLevel::High => 3,
            RiskLevel::VeryHigh => 4,
        }
    }

    /// Stable kebab-case key, shared with the persisted preference values.
    pub fn key(&self) -> &'static str {
        match self {
            RiskLevel::None => "none",
            RiskLevel::VeryLow => "very-low",
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::VeryHigh => "very-high",
        }
    }

    /// Label shown to the user in notifications.
    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::None => "Nenhuma",
            RiskLevel::VeryLow => "Muito Baixa",
            RiskLevel::Low => "Baixa",
            RiskLevel::Moderate => "Moderada",
            RiskLevel::High => "Alta",
            RiskLevel::VeryHigh => "Muito Alta",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        RiskLevel::all()
            .into_iter()
            .find(|level| level.key() == normalized)
            .ok_or_else(|| format!("Unknown risk level: {}", s))
    }
}

/// A rendered notification handed to the [`crate::NotificationSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Session that produced the alert
    pub session_id: SessionId,

    /// Level of the zone that was entered
    pub level: RiskLevel,

    /// Grid index of the containing cell
    pub cell_id: usize,

    pub title: String,
    pub body: String,
}

/// Push-style input delivered by the device layer.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// A new position fix
    Fix(LocationFix),

    /// The persisted preferences were written externally (e.g. settings screen closed)
    PreferencesChanged,

    /// The platform location service was switched on or off
    ServicesChanged(bool),
}

/// Identifier for a geofence session.
///
/// Only used to tell concurrent sessions apart in logs and alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Creates a new random SessionId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic SessionId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}
