//! Notification threshold policy.
//!
//! The user picks the lowest risk level they want to hear about. The choice
//! is persisted by the settings screen under [`PREFERENCE_KEY`] and read
//! back here; anything missing or unreadable falls back to `Moderate`.

use safeway_env::{EnvError, PreferenceStore, RiskLevel};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Preference store key written by the settings screen.
pub const PREFERENCE_KEY: &str = "notificationLevel";

/// Minimum ordinal for `Disabled`: above every level, never satisfied.
pub const DISABLED_SENTINEL: i32 = RiskLevel::MAX_ORDINAL + 1;

/// User-selected notification threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationPreference {
    #[serde(alias = "none")]
    Disabled,
    VeryLow,
    Low,
    #[default]
    Moderate,
    High,
    VeryHigh,
}

impl NotificationPreference {
    /// All preferences, most permissive first.
    pub fn all() -> [NotificationPreference; 6] {
        [
            NotificationPreference::Disabled,
            NotificationPreference::VeryLow,
            NotificationPreference::Low,
            NotificationPreference::Moderate,
            NotificationPreference::High,
            NotificationPreference::VeryHigh,
        ]
    }

    /// Value persisted in the preference store.
    ///
    /// `Disabled` is stored as `none`, the value the settings screen writes.
    pub fn key(&self) -> &'static str {
        match self {
            NotificationPreference::Disabled => "none",
            NotificationPreference::VeryLow => "very-low",
            NotificationPreference::Low => "low",
            NotificationPreference::Moderate => "moderate",
            NotificationPreference::High => "high",
            NotificationPreference::VeryHigh => "very-high",
        }
    }

    /// The risk level of the same name, `None` for `Disabled`.
    pub fn level(&self) -> Option<RiskLevel> {
        match self {
            NotificationPreference::Disabled => None,
            NotificationPreference::VeryLow => Some(RiskLevel::VeryLow),
            NotificationPreference::Low => Some(RiskLevel::Low),
            NotificationPreference::Moderate => Some(RiskLevel::Moderate),
            NotificationPreference::High => Some(RiskLevel::High),
            NotificationPreference::VeryHigh => Some(RiskLevel::VeryHigh),
        }
    }
}

impl std::fmt::Display for NotificationPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl std::str::FromStr for NotificationPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "none" | "disabled" => Ok(NotificationPreference::Disabled),
            "very-low" => Ok(NotificationPreference::VeryLow),
            "low" => Ok(NotificationPreference::Low),
            "moderate" => Ok(NotificationPreference::Moderate),
            "high" => Ok(NotificationPreference::High),
            "very-high" => Ok(NotificationPreference::VeryHigh),
            _ => Err(format!("Unknown notification preference: {}", s)),
        }
    }
}

/// Preference → minimum ordinal table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThresholdTable {
    /// Each preference requires the level of the same name or above
    #[default]
    Identity,

    /// Older table: each preference requires one tier above its name,
    /// capped at `VeryHigh`
    LegacyShifted,
}

/// Decides whether a level is severe enough to notify about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThresholdPolicy {
    table: ThresholdTable,
}

impl ThresholdPolicy {
    pub fn new(table: ThresholdTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> ThresholdTable {
        self.table
    }

    /// Minimum level ordinal required to notify.
    pub fn minimum_ordinal(&self, pref: NotificationPreference) -> i32 {
        let Some(level) = pref.level() else {
            return DISABLED_SENTINEL;
        };

        match self.table {
            ThresholdTable::Identity => level.ordinal(),
            ThresholdTable::LegacyShifted => (level.ordinal() + 1).min(RiskLevel::MAX_ORDINAL),
        }
    }

    /// `pref != Disabled && level.ordinal() >= minimum_ordinal(pref)`
    pub fn should_consider_notifying(&self, pref: NotificationPreference, level: RiskLevel) -> bool {
        pref != NotificationPreference::Disabled && level.ordinal() >= self.minimum_ordinal(pref)
    }
}

/// Minimum ordinal with the identity table.
pub fn minimum_ordinal(pref: NotificationPreference) -> i32 {
    ThresholdPolicy::default().minimum_ordinal(pref)
}

/// Threshold check with the identity table.
pub fn should_consider_notifying(pref: NotificationPreference, level: RiskLevel) -> bool {
    ThresholdPolicy::default().should_consider_notifying(pref, level)
}

/// Reads the persisted preference, falling back to `Moderate`.
///
/// A missing key is the normal first-run case. A store failure or an
/// unrecognised value is logged and also yields the default.
pub fn read_preference<S: PreferenceStore + ?Sized>(store: &S) -> NotificationPreference {
    match store.get(PREFERENCE_KEY) {
        Ok(Some(raw)) => raw.parse().unwrap_or_else(|e| {
            warn!("{}; using {}", e, NotificationPreference::default());
            NotificationPreference::default()
        }),
        Ok(None) => NotificationPreference::default(),
        Err(e) => {
            warn!(
                "Failed to read notification preference: {}; using {}",
                e,
                NotificationPreference::default()
            );
            NotificationPreference::default()
        }
    }
}

/// Persists a preference in the format the settings screen uses.
pub fn write_preference<S: PreferenceStore + ?Sized>(
    store: &S,
    pref: NotificationPreference,
) -> Result<(), EnvError> {
    store.set(PREFERENCE_KEY, pref.key())
}

#[cfg(test)]
mod tests {
    use super::*;
    use safeway_env::MemoryPreferenceStore;

    struct BrokenStore;

    impl PreferenceStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, EnvError> {
            Err(EnvError::store("disk on fire"))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), EnvError> {
            Err(EnvError::store("disk on fire"))
        }
    }

    #[test]
    fn test_identity_minimum_ordinals() {
        assert_eq!(minimum_ordinal(NotificationPreference::VeryLow), 0);
        assert_eq!(minimum_ordinal(NotificationPreference::Low), 1);
        assert_eq!(minimum_ordinal(NotificationPreference::Moderate), 2);
        assert_eq!(minimum_ordinal(NotificationPreference::High), 3);
        assert_eq!(minimum_ordinal(NotificationPreference::VeryHigh), 4);
        assert!(minimum_ordinal(NotificationPreference::Disabled) > RiskLevel::MAX_ORDINAL);
    }

    #[test]
    fn test_moderate_means_moderate_or_worse() {
        let pref = NotificationPreference::Moderate;
        assert!(!should_consider_notifying(pref, RiskLevel::Low));
        assert!(should_consider_notifying(pref, RiskLevel::Moderate));
        assert!(should_consider_notifying(pref, RiskLevel::High));
        assert!(should_consider_notifying(pref, RiskLevel::VeryHigh));
    }

    #[test]
    fn test_disabled_never_notifies() {
        for table in [ThresholdTable::Identity, ThresholdTable::LegacyShifted] {
            let policy = ThresholdPolicy::new(table);
            for level in RiskLevel::all() {
                assert!(!policy.should_consider_notifying(NotificationPreference::Disabled, level));
            }
        }
    }

    #[test]
    fn test_none_level_never_notifies() {
        for pref in NotificationPreference::all() {
            assert!(!should_consider_notifying(pref, RiskLevel::None));
        }
    }

    #[test]
    fn test_legacy_shifted_table() {
        let policy = ThresholdPolicy::new(ThresholdTable::LegacyShifted);
        // Old table counted from none = 0: low -> 3, moderate -> 4
        assert_eq!(policy.minimum_ordinal(NotificationPreference::Low), RiskLevel::Moderate.ordinal());
        assert_eq!(policy.minimum_ordinal(NotificationPreference::Moderate), RiskLevel::High.ordinal());
        assert_eq!(policy.minimum_ordinal(NotificationPreference::High), RiskLevel::VeryHigh.ordinal());
        assert_eq!(policy.minimum_ordinal(NotificationPreference::VeryHigh), RiskLevel::VeryHigh.ordinal());
        assert_eq!(policy.minimum_ordinal(NotificationPreference::Low) + 1, 3);
        assert_eq!(policy.minimum_ordinal(NotificationPreference::Moderate) + 1, 4);
        assert!(!policy.should_consider_notifying(NotificationPreference::Moderate, RiskLevel::Moderate));
        assert!(policy.should_consider_notifying(NotificationPreference::Moderate, RiskLevel::High));
    }

    #[test]
    fn test_preference_parsing() {
        assert_eq!("none".parse::<NotificationPreference>(), Ok(NotificationPreference::Disabled));
        assert_eq!("DISABLED".parse::<NotificationPreference>(), Ok(NotificationPreference::Disabled));
        assert_eq!("very_high".parse::<NotificationPreference>(), Ok(NotificationPreference::VeryHigh));
        assert_eq!(" low ".parse::<NotificationPreference>(), Ok(NotificationPreference::Low));
        assert!("sometimes".parse::<NotificationPreference>().is_err());

        for pref in NotificationPreference::all() {
            assert_eq!(pref.key().parse::<NotificationPreference>(), Ok(pref));
        }
    }

    #[test]
    fn test_read_preference_fallbacks() {
        assert_eq!(
            read_preference(&MemoryPreferenceStore::new()),
            NotificationPreference::Moderate
        );
        assert_eq!(
            read_preference(&MemoryPreferenceStore::with_value(PREFERENCE_KEY, "garbage")),
            NotificationPreference::Moderate
        );
        assert_eq!(read_preference(&BrokenStore), NotificationPreference::Moderate);
        assert_eq!(
            read_preference(&MemoryPreferenceStore::with_value(PREFERENCE_KEY, "very-low")),
            NotificationPreference::VeryLow
        );
    }

    #[test]
    fn test_write_then_read() {
        let store = MemoryPreferenceStore::new();
        write_preference(&store, NotificationPreference::Disabled).unwrap();
        assert_eq!(store.get(PREFERENCE_KEY).unwrap().as_deref(), Some("none"));
        assert_eq!(read_preference(&store), NotificationPreference::Disabled);

        assert!(write_preference(&BrokenStore, NotificationPreference::High).is_err());
    }
}
