//! Scaling function — maps queue length to a desired runner count.
//!
//! # Curve
//!
//! ```text
//! queue == 0      → min_workers
//! linear          → queue
//! logistic        → C / (1 + A·B^queue)   C = A = max_workers, B = e^-scale_factor
//! then clamp to [min_workers, max_workers], round, and never report 0
//! while there is queued work
//! ```
//!
//! The policy also schedules periodic forced scale-ups: a window of
//! `force_scale_up_window` during which the served value is pinned to
//! `max_workers`, repeated every `force_scale_up_frequency` plus a random
//! stagger of up to a day.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use tracing::trace;

use crate::error::{ConfigError, ConfigResult};

/// Upper bound of the random offset added to every scheduled window.
const FORCED_SCALE_STAGGER_SECS: u64 = 24 * 60 * 60;

/// Default length of a forced scale-up window.
pub const DEFAULT_FORCE_SCALE_UP_WINDOW: Duration = Duration::from_secs(20 * 60);

/// Default time between forced scale-up windows.
pub const DEFAULT_FORCE_SCALE_UP_FREQUENCY: Duration = Duration::from_secs(20 * 24 * 60 * 60);

/// Scaling parameters for one workflow. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingPolicy {
    min_workers: u32,
    max_workers: u32,
    scale_factor: f64,
    force_scale_up_window: Duration,
    force_scale_up_frequency: Duration,
}

/// Result of a forced-scale calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForcedScale {
    /// The forced window is open right now.
    pub active: bool,
    /// Schedule to persist for the next call.
    pub next: Option<DateTime<Utc>>,
}

impl ScalingPolicy {
    /// Build a policy with the default forced scale-up schedule.
    ///
    /// A `scale_factor` of 0 selects linear mode.
    pub fn new(min_workers: u32, max_workers: u32, scale_factor: f64) -> ConfigResult<Self> {
        if min_workers > max_workers {
            return Err(ConfigError::Scaling {
                name: String::new(),
                reason: format!("min_workers {min_workers} exceeds max_workers {max_workers}"),
            });
        }
        if !scale_factor.is_finite() || scale_factor < 0.0 {
            return Err(ConfigError::Scaling {
                name: String::new(),
                reason: format!("scale_factor must be a non-negative number, got {scale_factor}"),
            });
        }
        Ok(Self {
            min_workers,
            max_workers,
            scale_factor,
            force_scale_up_window: DEFAULT_FORCE_SCALE_UP_WINDOW,
            force_scale_up_frequency: DEFAULT_FORCE_SCALE_UP_FREQUENCY,
        })
    }

    /// Replace the forced scale-up schedule. A zero window disables it.
    pub fn with_forced_scale(mut self, window: Duration, frequency: Duration) -> Self {
        self.force_scale_up_window = window;
        self.force_scale_up_frequency = frequency;
        self
    }

    pub fn min_workers(&self) -> u32 {
        self.min_workers
    }

    pub fn max_workers(&self) -> u32 {
        self.max_workers
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn linear(&self) -> bool {
        self.scale_factor == 0.0
    }

    pub fn force_scale_up_window(&self) -> Duration {
        self.force_scale_up_window
    }

    pub fn force_scale_up_frequency(&self) -> Duration {
        self.force_scale_up_frequency
    }

    /// Desired worker count for a queue of `queue_length` jobs.
    pub fn output(&self, queue_length: u32) -> u32 {
        if queue_length == 0 {
            return self.min_workers;
        }

        let min = f64::from(self.min_workers);
        let max = f64::from(self.max_workers);
        let raw = if self.linear() {
            f64::from(queue_length)
        } else {
            logistic(max, max, self.scale_factor, f64::from(queue_length))
        };

        let clamped = raw.clamp(min, max);
        let mut result = clamped.round() as u32;
        if result == 0 {
            result = 1;
        }

        trace!(
            queue_length,
            linear = self.linear(),
            min_workers = self.min_workers,
            max_workers = self.max_workers,
            scale_factor = self.scale_factor,
            raw,
            result,
            "scaling output"
        );
        result
    }

    /// Decide whether a forced scale-up is active and what the next
    /// schedule is, using the system clock and thread RNG.
    pub fn calculate_forced_scale(&self, next: Option<DateTime<Utc>>) -> ForcedScale {
        self.calculate_forced_scale_at(Utc::now(), next, &mut rand::rng())
    }

    /// Forced-scale decision against an explicit clock reading and RNG.
    pub fn calculate_forced_scale_at<R: Rng + ?Sized>(
        &self,
        now: DateTime<Utc>,
        next: Option<DateTime<Utc>>,
        rng: &mut R,
    ) -> ForcedScale {
        if self.force_scale_up_window.is_zero() {
            return ForcedScale {
                active: false,
                next,
            };
        }

        let stagger = Duration::from_secs(rng.random_range(0..FORCED_SCALE_STAGGER_SECS));
        let Some(next) = next else {
            return ForcedScale {
                active: false,
                next: Some(add_duration(now, stagger)),
            };
        };

        let window_end = add_duration(next, self.force_scale_up_window);
        if window_end < now {
            ForcedScale {
                active: false,
                next: Some(add_duration(now, self.force_scale_up_frequency + stagger)),
            }
        } else if next < now {
            ForcedScale {
                active: true,
                next: Some(next),
            }
        } else {
            ForcedScale {
                active: false,
                next: Some(next),
            }
        }
    }
}

/// Logistic curve; see <https://www.desmos.com/calculator/agxuc5gip8>.
fn logistic(c: f64, a: f64, k: f64, x: f64) -> f64 {
    let b = (-k).exp();
    c / (1.0 + a * b.powf(x))
}

/// Add a std duration to a timestamp, saturating at the maximum date.
pub fn add_duration(at: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(d)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn policy(min: u32, max: u32, factor: f64) -> ScalingPolicy {
        ScalingPolicy::new(min, max, factor).unwrap()
    }

    fn assert_outputs(max: u32, factor: f64, expected: &[u32]) {
        let p = policy(1, max, factor);
        for (queue, want) in expected.iter().enumerate() {
            assert_eq!(
                p.output(queue as u32),
                *want,
                "max={max} factor={factor}: queue {queue} should give {want}"
            );
        }
    }

    fn forced_policy() -> ScalingPolicy {
        policy(1, 10, 1.0).with_forced_scale(
            Duration::from_secs(20 * 60),
            Duration::from_secs(20 * 24 * 60 * 60),
        )
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn rejects_min_above_max() {
        assert!(ScalingPolicy::new(5, 2, 1.0).is_err());
        assert!(ScalingPolicy::new(0, 0, 1.0).is_ok());
    }

    #[test]
    fn rejects_negative_or_nan_factor() {
        assert!(ScalingPolicy::new(0, 4, -0.5).is_err());
        assert!(ScalingPolicy::new(0, 4, f64::NAN).is_err());
    }

    #[test]
    fn zero_factor_is_linear() {
        assert!(policy(0, 4, 0.0).linear());
        assert!(!policy(0, 4, 0.5).linear());
    }

    #[test]
    fn min_workers_when_no_work() {
        let p = policy(1, 10, 1.0);
        assert_eq!(p.output(0), 1);
        assert_eq!(policy(3, 10, 0.0).output(0), 3);
    }

    #[test]
    fn linear_tracks_queue_until_max() {
        let p = policy(1, 10, 0.0);
        for q in 1..=10 {
            assert_eq!(p.output(q), q);
        }
        assert_eq!(p.output(20), 10);
    }

    #[test]
    fn logistic_bounds() {
        let mut p = policy(0, 4, 0.5);
        assert_eq!(p.output(30), 4);
        assert_eq!(p.output(1), 1);
        p = policy(2, 4, 0.5);
        assert_eq!(p.output(1), 2);
    }

    #[test]
    fn logistic_tables() {
        assert_outputs(
            10,
            0.25,
            &[1, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 7, 7, 8, 8, 8, 9, 9, 9, 9, 10],
        );
        assert_outputs(10, 0.5, &[1, 1, 2, 3, 4, 5, 7, 8, 8, 9, 9, 10]);
        assert_outputs(10, 1.0, &[1, 2, 4, 7, 8, 9, 10]);
        assert_outputs(
            100,
            0.5,
            &[
                1, 2, 3, 4, 7, 11, 17, 25, 35, 47, 60, 71, 80, 87, 92, 95, 97, 98, 99, 99, 100,
            ],
        );
        assert_outputs(100, 1.0, &[1, 3, 7, 17, 35, 60, 80, 92, 97, 99, 100]);
    }

    #[test]
    fn five_queued_jobs_with_half_factor() {
        assert_eq!(policy(1, 10, 0.5).output(5), 5);
    }

    #[test]
    fn output_is_monotonic_and_bounded() {
        for factor in [0.0, 0.1, 0.5, 1.0, 3.0] {
            for (min, max) in [(0, 1), (0, 10), (2, 7), (5, 5)] {
                let p = policy(min, max, factor);
                assert_eq!(p.output(0), min);
                let mut previous = p.output(0);
                for q in 1..=max * 2 {
                    let out = p.output(q);
                    assert!(out >= 1, "queue {q} gave zero");
                    assert!(out >= min && out <= max.max(1), "queue {q} out of bounds: {out}");
                    if q <= max {
                        assert!(out >= previous, "not monotonic at {q} (factor {factor})");
                    }
                    previous = out;
                }
            }
        }
    }

    #[test]
    fn never_zero_with_queued_work() {
        let p = policy(0, 0, 1.0);
        assert_eq!(p.output(0), 0);
        assert_eq!(p.output(3), 1);
    }

    #[test]
    fn forced_scale_schedules_within_a_day_when_unset() {
        let now = Utc::now();
        let result = forced_policy().calculate_forced_scale_at(now, None, &mut rng());
        assert!(!result.active);
        let next = result.next.unwrap();
        assert!(next >= now);
        assert!(next < now + TimeDelta::hours(24));
    }

    #[test]
    fn forced_scale_rolls_forward_after_window() {
        let p = forced_policy();
        let now = Utc::now();
        let yesterday = now - TimeDelta::hours(24);
        let result = p.calculate_forced_scale_at(now, Some(yesterday), &mut rng());
        assert!(!result.active);
        let next = result.next.unwrap();
        let frequency = TimeDelta::from_std(p.force_scale_up_frequency()).unwrap();
        assert!(next >= now + frequency);
        assert!(next < now + frequency + TimeDelta::hours(24));
    }

    #[test]
    fn forced_scale_active_inside_window() {
        let now = Utc::now();
        let five_mins_ago = now - TimeDelta::minutes(5);
        let result = forced_policy().calculate_forced_scale_at(now, Some(five_mins_ago), &mut rng());
        assert!(result.active);
        assert_eq!(result.next, Some(five_mins_ago));
    }

    #[test]
    fn forced_scale_waits_for_future_window() {
        let now = Utc::now();
        let in_an_hour = now + TimeDelta::hours(1);
        let result = forced_policy().calculate_forced_scale_at(now, Some(in_an_hour), &mut rng());
        assert!(!result.active);
        assert_eq!(result.next, Some(in_an_hour));
    }

    #[test]
    fn forced_scale_disabled_with_zero_window() {
        let p = policy(1, 10, 1.0).with_forced_scale(Duration::ZERO, Duration::from_secs(60));
        let now = Utc::now();
        let result = p.calculate_forced_scale_at(now, Some(now), &mut rng());
        assert_eq!(result, ForcedScale { active: false, next: Some(now) });

        let result = p.calculate_forced_scale_at(now, None, &mut rng());
        assert_eq!(result, ForcedScale { active: false, next: None });
    }

    #[test]
    fn forced_scale_is_stable_until_boundary() {
        let p = forced_policy();
        let mut rng = rng();
        let mut now = Utc::now();
        let first = p.calculate_forced_scale_at(now, None, &mut rng);
        let mut schedule = first.next;
        for _ in 0..10 {
            now += TimeDelta::seconds(30);
            let again = p.calculate_forced_scale_at(now, schedule, &mut rng);
            assert_eq!(again.next, schedule);
            schedule = again.next;
        }
    }

    #[test]
    fn system_clock_variant_schedules_in_future() {
        let result = forced_policy().calculate_forced_scale(None);
        assert!(!result.active);
        assert!(result.next.unwrap() >= Utc::now() - TimeDelta::seconds(1));
    }
}
