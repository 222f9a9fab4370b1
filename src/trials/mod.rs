use crate::error::{BenchError, Result};
use crate::invocation::{Invocation, Runner};

/// Each retry multiplies the trial count by this factor.
pub const GROWTH_FACTOR: u64 = 10;

/// Outcome of an adaptive timing run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StableTime {
    /// Seconds per trial, `total_time / trials`.
    pub mean_time: f64,
    pub total_time: f64,
    /// Trial count of the batch that met the time floor.
    pub trials: u64,
}

/// Grows the trial count of an invocation until one batch runs for at least
/// `min_wall_time` seconds, amortizing process start-up over the batch.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveTimer {
    pub min_wall_time: f64,
    pub max_trials: u64,
}

impl AdaptiveTimer {
    pub fn new(min_wall_time: f64, max_trials: u64) -> Self {
        AdaptiveTimer {
            min_wall_time,
            max_trials,
        }
    }

    /// Each attempt is a fresh batch; nothing carries over between attempts.
    pub fn measure_stable_mean_time<R: Runner>(
        &self,
        runner: &R,
        invocation: &Invocation,
    ) -> Result<StableTime> {
        let mut trials = 1u64;
        loop {
            let measurement = runner.run(&invocation.with_trials(trials))?;
            if measurement.time_total >= self.min_wall_time {
                log::debug!(
                    "{}: {} trials in {:.4}s",
                    invocation.program().binary_name(),
                    trials,
                    measurement.time_total
                );
                return Ok(StableTime {
                    mean_time: measurement.time_total / trials as f64,
                    total_time: measurement.time_total,
                    trials,
                });
            }

            let next = trials.saturating_mul(GROWTH_FACTOR);
            if next > self.max_trials || next == trials {
                return Err(BenchError::Unstable {
                    trials,
                    total_time: measurement.time_total,
                    min_wall_time: self.min_wall_time,
                });
            }
            trials = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::{Measurement, SpmvInvocation};
    use approx::assert_relative_eq;
    use std::cell::RefCell;
    use std::path::PathBuf;

    struct LinearClock {
        per_trial: f64,
        seen: RefCell<Vec<u64>>,
    }

    impl Runner for LinearClock {
        fn run(&self, invocation: &Invocation) -> Result<Measurement> {
            let trials = invocation.trials();
            self.seen.borrow_mut().push(trials);
            Ok(Measurement {
                time_mean: self.per_trial,
                time_total: self.per_trial * trials as f64,
                results: None,
            })
        }
    }

    fn spmv() -> Invocation {
        Invocation::Spmv(SpmvInvocation {
            matrix: PathBuf::from("m.mtx"),
            rows: 1,
            cols: 1,
            trials: 7,
        })
    }

    #[test]
    fn grows_by_ten_until_floor_is_met() {
        let clock = LinearClock {
            per_trial: 0.001,
            seen: RefCell::new(Vec::new()),
        };
        let timer = AdaptiveTimer::new(0.1, 1_000_000);
        let stable = timer.measure_stable_mean_time(&clock, &spmv()).unwrap();

        assert_eq!(stable.trials, 100);
        assert_relative_eq!(stable.mean_time, 0.001, epsilon = 1e-12);
        assert_eq!(*clock.seen.borrow(), vec![1, 10, 100]);
    }

    #[test]
    fn slow_program_needs_one_attempt() {
        let clock = LinearClock {
            per_trial: 0.5,
            seen: RefCell::new(Vec::new()),
        };
        let stable = AdaptiveTimer::new(0.1, 1000)
            .measure_stable_mean_time(&clock, &spmv())
            .unwrap();
        assert_eq!(stable.trials, 1);
        assert_eq!(stable.mean_time, 0.5);
    }

    #[test]
    fn ceiling_reports_instability() {
        let clock = LinearClock {
            per_trial: 0.0,
            seen: RefCell::new(Vec::new()),
        };
        let err = AdaptiveTimer::new(0.1, 1000)
            .measure_stable_mean_time(&clock, &spmv())
            .unwrap_err();
        assert!(matches!(err, BenchError::Unstable { trials: 1000, .. }));
        assert_eq!(clock.seen.borrow().len(), 4);
    }
}
