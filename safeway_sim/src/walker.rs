//! Seeded pedestrian tracks.
//!
//! Produces location fixes the way a phone reports them while walking:
//! a heading that drifts, a roughly constant pace, and GPS jitter on top.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use safeway_env::{Coordinate, LocationFix};

/// Approximate meters per degree of latitude.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Random-walk parameters.
#[derive(Debug, Clone)]
pub struct WalkConfig {
    /// Distance covered between fixes (meters)
    pub step_m: f64,

    /// Standard deviation of heading change per step (radians)
    pub heading_std: f64,

    /// GPS jitter standard deviation (meters)
    pub jitter_std_m: f64,

    /// Time between fixes (milliseconds)
    pub interval_ms: u64,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            step_m: 40.0,
            heading_std: 0.4,
            jitter_std_m: 5.0,
            interval_ms: 2_000,
        }
    }
}

/// Deterministic random walk from a start point.
pub struct RandomWalk {
    rng: ChaCha8Rng,
    config: WalkConfig,
    heading: f64,
    position: Coordinate,
    timestamp_ms: u64,
}

impl RandomWalk {
    pub fn new(seed: u64, start: Coordinate, config: WalkConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let heading = rng.gen_range(0.0..std::f64::consts::TAU);
        Self {
            rng,
            config,
            heading,
            position: start,
            timestamp_ms: 0,
        }
    }

    /// True position (without jitter).
    pub fn position(&self) -> Coordinate {
        self.position
    }

    /// Advances one step and returns the reported fix.
    pub fn step(&mut self) -> LocationFix {
        let heading_noise = Normal::new(0.0, self.config.heading_std.max(f64::EPSILON))
            .map(|d| d.sample(&mut self.rng))
            .unwrap_or(0.0);
        self.heading += heading_noise;

        self.position = offset(
            self.position,
            self.config.step_m * self.heading.cos(),
            self.config.step_m * self.heading.sin(),
        );

        let (jitter_n, jitter_e) = match Normal::new(0.0, self.config.jitter_std_m.max(f64::EPSILON)) {
            Ok(d) => (d.sample(&mut self.rng), d.sample(&mut self.rng)),
            Err(_) => (0.0, 0.0),
        };

        self.timestamp_ms += self.config.interval_ms;
        LocationFix {
            coordinate: offset(self.position, jitter_n, jitter_e),
            timestamp_ms: self.timestamp_ms,
            accuracy_m: Some(self.config.jitter_std_m * 2.0),
        }
    }

    /// Takes `n` steps.
    pub fn take_fixes(&mut self, n: usize) -> Vec<LocationFix> {
        (0..n).map(|_| self.step()).collect()
    }
}

/// Moves a coordinate by north/east meters (flat-earth approximation).
pub fn offset(from: Coordinate, north_m: f64, east_m: f64) -> Coordinate {
    let lat = from.latitude + north_m / METERS_PER_DEGREE;
    let cos_lat = from.latitude.to_radians().cos().abs().max(1e-6);
    let lon = from.longitude + east_m / (METERS_PER_DEGREE * cos_lat);
    Coordinate::new(lat, lon)
}

/// Fixes at each waypoint in turn, `interval_ms` apart.
pub fn scripted_track(waypoints: &[Coordinate], interval_ms: u64) -> Vec<LocationFix> {
    waypoints
        .iter()
        .enumerate()
        .map(|(i, &c)| LocationFix::new(c, (i as u64 + 1) * interval_ms))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_walk_is_deterministic() {
        let start = Coordinate::new(-23.55, -46.63);
        let a = RandomWalk::new(7, start, WalkConfig::default()).take_fixes(50);
        let b = RandomWalk::new(7, start, WalkConfig::default()).take_fixes(50);
        assert_eq!(a, b);

        let c = RandomWalk::new(8, start, WalkConfig::default()).take_fixes(50);
        assert_ne!(a, c);
    }

    #[test]
    fn test_walk_timestamps_increase() {
        let mut walk = RandomWalk::new(1, Coordinate::new(0.0, 0.0), WalkConfig::default());
        let fixes = walk.take_fixes(10);
        for pair in fixes.windows(2) {
            assert_eq!(pair[1].timestamp_ms - pair[0].timestamp_ms, 2_000);
        }
    }

    #[test]
    fn test_step_length_without_noise() {
        let config = WalkConfig {
            step_m: 100.0,
            heading_std: 0.0,
            jitter_std_m: 0.0,
            interval_ms: 1_000,
        };
        let start = Coordinate::new(0.0, 0.0);
        let mut walk = RandomWalk::new(3, start, config);
        walk.step();
        let p = walk.position();

        let north = (p.latitude - start.latitude) * METERS_PER_DEGREE;
        let east = (p.longitude - start.longitude) * METERS_PER_DEGREE;
        assert_relative_eq!((north * north + east * east).sqrt(), 100.0, epsilon = 1e-6);
    }

    #[test]
    fn test_offset_north() {
        let moved = offset(Coordinate::new(10.0, 20.0), METERS_PER_DEGREE, 0.0);
        assert_relative_eq!(moved.latitude, 11.0, epsilon = 1e-9);
        assert_relative_eq!(moved.longitude, 20.0, epsilon = 1e-9);
    }

    proptest! {
        #[test]
        fn prop_offset_round_trip(
            lat in -60.0f64..60.0,
            lon in -170.0f64..170.0,
            north in -500.0f64..500.0,
            east in -500.0f64..500.0,
        ) {
            let start = Coordinate::new(lat, lon);
            let there = offset(start, north, east);
            let back = offset(there, -north, 0.0);
            prop_assert!((back.latitude - lat).abs() < 1e-9);

            let moved_east = (there.longitude - lon) * METERS_PER_DEGREE * lat.to_radians().cos();
            prop_assert!((moved_east - east).abs() < 1e-6);
        }
    }
}
