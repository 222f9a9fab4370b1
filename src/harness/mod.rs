use crate::cache::{ArtifactKey, ArtifactStore};
use crate::config::Experiment;
use crate::error::{BenchError, Result};
use crate::invocation::{FillInvocation, FillParams, Invocation, Measurement, Program, Runner, SpmvInvocation};
use crate::matrix_market;
use crate::registry::{MatrixEntry, MatrixIdentity, MatrixRegistry};
use crate::trials::{AdaptiveTimer, StableTime};
use ndarray::{Array2, Array3, Axis};
use std::path::Path;
use std::time::Duration;

/// Registry key under which the synthetic dense matrix is visible while the
/// profile is measured.
pub const DENSE_PROFILE_KEY: &str = "__dense_profile__";

/// Sampled estimates from one estimator run.
#[derive(Debug, Clone)]
pub struct FillRun {
    pub params: FillParams,
    pub trials: u64,
    pub time_mean: f64,
    pub time_total: f64,
    /// Shape `(trials, B, B)`.
    pub estimates: Array3<f64>,
}

/// Everything needed to drive external programs for one experiment:
/// the descriptor, the matrix registry, the artifact cache and a runner.
pub struct Harness<'a, R: Runner> {
    experiment: &'a Experiment,
    registry: MatrixRegistry,
    store: ArtifactStore,
    runner: R,
    timer: AdaptiveTimer,
}

impl<'a, R: Runner> Harness<'a, R> {
    /// Loads the matrix registry named by the experiment.
    pub fn new(experiment: &'a Experiment, runner: R) -> Result<Self> {
        let registry = MatrixRegistry::load(&experiment.matrix_path, &experiment.matrix_registry_path)?;
        Ok(Self::with_registry(experiment, registry, runner))
    }

    pub fn with_registry(experiment: &'a Experiment, registry: MatrixRegistry, runner: R) -> Self {
        Harness {
            experiment,
            registry,
            store: ArtifactStore::new(
                experiment.experiment_dir(),
                Duration::from_secs(experiment.lock_timeout_secs),
            ),
            runner,
            timer: AdaptiveTimer::new(experiment.min_wall_time, experiment.max_adaptive_trials),
        }
    }

    pub fn experiment(&self) -> &'a Experiment {
        self.experiment
    }

    pub fn registry(&self) -> &MatrixRegistry {
        &self.registry
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn matrix(&self, key: &str) -> Result<MatrixIdentity> {
        self.registry.resolve(key)
    }

    /// Runs a fill program once on `matrix`.
    pub fn invoke(
        &self,
        program: Program,
        matrix: &Path,
        params: FillParams,
        trials: u64,
        results: bool,
    ) -> Result<Measurement> {
        if trials == 0 {
            return Err(BenchError::Precondition("trial count must be at least 1".to_string()));
        }
        self.runner.run(&Invocation::Fill(FillInvocation {
            program,
            matrix: matrix.to_path_buf(),
            params,
            trials,
            clock: true,
            results,
        }))
    }

    /// Collects `trials` sampled estimates in a single run.
    pub fn fill_estimates(&self, program: Program, matrix: &Path, params: FillParams, trials: u64) -> Result<FillRun> {
        let measurement = self.invoke(program, matrix, params, trials, true)?;
        let estimates = measurement.results.ok_or_else(|| BenchError::BadResults {
            command: program.binary_name().to_string(),
            detail: "no estimates returned".to_string(),
        })?;
        Ok(FillRun {
            params,
            trials,
            time_mean: measurement.time_mean,
            time_total: measurement.time_total,
            estimates,
        })
    }

    /// Mean time per trial of `program`, with enough trials to amortize start-up.
    pub fn stable_time(&self, program: Program, matrix: &Path, params: FillParams) -> Result<StableTime> {
        let invocation = Invocation::Fill(FillInvocation {
            program,
            matrix: matrix.to_path_buf(),
            params,
            trials: 1,
            clock: true,
            results: false,
        });
        self.timer.measure_stable_mean_time(&self.runner, &invocation)
    }

    /// Exact fill of `matrix` up to block bound `b`, computed once per key.
    pub fn reference(&self, matrix: &str, b: usize) -> Result<Array2<f64>> {
        let key = ArtifactKey::Reference {
            matrix: matrix.to_string(),
            b,
        };
        self.store.get_or_compute(&key, || {
            let identity = self.registry.resolve(matrix)?;
            let invocation = Invocation::Fill(FillInvocation {
                program: Program::Reference,
                matrix: identity.path,
                params: FillParams {
                    b,
                    epsilon: self.experiment.epsilon,
                    delta: self.experiment.delta,
                    sigma: self.experiment.sigma,
                },
                trials: 1,
                clock: false,
                results: true,
            });
            let measurement = self.runner.run(&invocation)?;
            match measurement.results {
                Some(results) if results.len_of(Axis(0)) > 0 => Ok(results.index_axis(Axis(0), 0).to_owned()),
                _ => Err(BenchError::BadResults {
                    command: Program::Reference.binary_name().to_string(),
                    detail: "reference returned no estimate".to_string(),
                }),
            }
        })
    }

    /// Relative SpMV throughput on the synthetic dense matrix for block bound `b`,
    /// normalized so that the 1x1 entry is 1.
    pub fn profile(&mut self, b: usize) -> Result<Array2<f64>> {
        let experiment = self.experiment;
        let (m, n, trials) = (experiment.profile_m, experiment.profile_n, experiment.profile_trials);
        let key = ArtifactKey::Profile { b, m, n, trials };

        let Harness {
            registry,
            store,
            runner,
            ..
        } = self;

        store.get_or_compute(&key, || {
            // The dense matrix is shared by every profile of the same shape.
            let dense_dir = experiment.profile_dir();
            std::fs::create_dir_all(&dense_dir)?;
            let dense_path = dense_dir.join(format!("dense_{}_{}.mtx", m, n));
            if !dense_path.is_file() {
                log::info!("writing dense {}x{} profile matrix", m, n);
                matrix_market::write_dense(&dense_path, m, n)?;
            }

            // Registered only while it is measured.
            let entry = MatrixEntry {
                name: Some(format!("dense_{}_{}.mtx", m, n)),
                domain: Some("synthetic".to_string()),
                path: Some(dense_path),
                ..MatrixEntry::default()
            };
            registry.scoped(DENSE_PROFILE_KEY, entry, |registry| {
                let dense = registry.resolve(DENSE_PROFILE_KEY)?;
                let times = spmv_times(&*runner, &dense.path, b, trials)?;
                // Throughput relative to 1x1.
                let work = (m * n) as f64;
                let throughput = times.mapv(|t| work / t);
                let baseline = throughput[[0, 0]];
                Ok(throughput / baseline)
            })
        })
    }

    /// Absolute SpMV time of `matrix` at every block size up to `b`.
    pub fn spmv_record(&self, matrix: &str, b: usize) -> Result<Array2<f64>> {
        let trials = self.experiment.profile_trials;
        let key = ArtifactKey::Record {
            matrix: matrix.to_string(),
            b,
            trials,
        };
        self.store.get_or_compute(&key, || {
            let identity = self.registry.resolve(matrix)?;
            spmv_times(&self.runner, &identity.path, b, trials)
        })
    }
}

/// Mean SpMV time for every block size from 1x1 to `b`x`b`.
fn spmv_times<R: Runner>(runner: &R, matrix: &Path, b: usize, trials: u64) -> Result<Array2<f64>> {
    let mut times = Array2::zeros((b, b));
    for r in 1..=b {
        for c in 1..=b {
            let measurement = runner.run(&Invocation::Spmv(SpmvInvocation {
                matrix: matrix.to_path_buf(),
                rows: r,
                cols: c,
                trials,
            }))?;
            if !(measurement.time_mean > 0.0) {
                return Err(BenchError::Precondition(format!(
                    "spmv on {} at {}x{} reported time {}",
                    matrix.display(),
                    r,
                    c,
                    measurement.time_mean
                )));
            }
            times[[r - 1, c - 1]] = measurement.time_mean;
        }
    }
    Ok(times)
}
