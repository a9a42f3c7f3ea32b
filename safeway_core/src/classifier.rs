//! Risk classification: occurrence count → [`RiskLevel`].
//!
//! A step function over historical incident counts. Each tier is inclusive on
//! its lower bound, except the top tier which requires strictly more than
//! `very_high_above` occurrences.

use safeway_env::RiskLevel;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Tier boundaries for [`RiskTiers::classify`].
///
/// | occurrences              | level       |
/// |--------------------------|-------------|
/// | `> very_high_above`      | `VeryHigh`  |
/// | `[high, very_high_above]`| `High`      |
/// | `[moderate, high)`       | `Moderate`  |
/// | `[low, moderate)`        | `Low`       |
/// | `[very_low, low)`        | `VeryLow`   |
/// | `< very_low`             | `None`      |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskTiers {
    pub very_low: i64,
    pub low: i64,
    pub moderate: i64,
    pub high: i64,
    pub very_high_above: i64,
}

impl Default for RiskTiers {
    fn default() -> Self {
        Self {
            very_low: 50,
            low: 250,
            moderate: 500,
            high: 1000,
            very_high_above: 1500,
        }
    }
}

impl RiskTiers {
    /// Creates a validated tier table.
    pub fn new(
        very_low: i64,
        low: i64,
        moderate: i64,
        high: i64,
        very_high_above: i64,
    ) -> Result<Self, ConfigError> {
        let tiers = Self {
            very_low,
            low,
            moderate,
            high,
            very_high_above,
        };
        tiers.validate()?;
        Ok(tiers)
    }

    /// Checks that the boundaries ascend.
    ///
    /// `high == very_high_above` is allowed (the `High` tier is then a single count).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ascending = self.very_low < self.low
            && self.low < self.moderate
            && self.moderate < self.high
            && self.high <= self.very_high_above;

        if ascending {
            Ok(())
        } else {
            Err(ConfigError::InvalidTiers(format!(
                "boundaries must ascend: {} < {} < {} < {} <= {}",
                self.very_low, self.low, self.moderate, self.high, self.very_high_above
            )))
        }
    }

    /// Maps an occurrence count to its risk level.
    pub fn classify(&self, occurrence_count: i64) -> RiskLevel {
        if occurrence_count > self.very_high_above {
            RiskLevel::VeryHigh
        } else if occurrence_count >= self.high {
            RiskLevel::High
        } else if occurrence_count >= self.moderate {
            RiskLevel::Moderate
        } else if occurrence_count >= self.low {
            RiskLevel::Low
        } else if occurrence_count >= self.very_low {
            RiskLevel::VeryLow
        } else {
            RiskLevel::None
        }
    }
}

/// Classifies with the default tier table.
///
/// Negative counts never come out of the loader but classify as `None`.
pub fn classify(occurrence_count: i64) -> RiskLevel {
    RiskTiers::default().classify(occurrence_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_classify_boundaries() {
        let cases = [
            (49, RiskLevel::None),
            (50, RiskLevel::VeryLow),
            (249, RiskLevel::VeryLow),
            (250, RiskLevel::Low),
            (499, RiskLevel::Low),
            (500, RiskLevel::Moderate),
            (999, RiskLevel::Moderate),
            (1000, RiskLevel::High),
            (1500, RiskLevel::High),
            (1501, RiskLevel::VeryHigh),
        ];

        for (count, expected) in cases {
            assert_eq!(classify(count), expected, "count {}", count);
        }
    }

    #[test]
    fn test_classify_negative_and_zero() {
        assert_eq!(classify(0), RiskLevel::None);
        assert_eq!(classify(-1), RiskLevel::None);
        assert_eq!(classify(i64::MIN), RiskLevel::None);
        assert_eq!(classify(i64::MAX), RiskLevel::VeryHigh);
    }

    #[test]
    fn test_tiers_validation() {
        assert!(RiskTiers::new(10, 20, 30, 40, 40).is_ok());
        assert!(RiskTiers::new(10, 10, 30, 40, 50).is_err());
        assert!(RiskTiers::new(10, 20, 30, 60, 50).is_err());
        assert!(RiskTiers::default().validate().is_ok());
    }

    #[test]
    fn test_custom_tiers() {
        let tiers = RiskTiers::new(1, 2, 3, 4, 5).unwrap();
        assert_eq!(tiers.classify(0), RiskLevel::None);
        assert_eq!(tiers.classify(3), RiskLevel::Moderate);
        assert_eq!(tiers.classify(5), RiskLevel::High);
        assert_eq!(tiers.classify(6), RiskLevel::VeryHigh);
    }

    proptest! {
        #[test]
        fn prop_classify_is_monotonic(a in -10_000i64..10_000, b in -10_000i64..10_000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(classify(lo) <= classify(hi));
        }
    }
}
