#![allow(dead_code)]

use fill_benchmark_rs::config::Experiment;
use fill_benchmark_rs::invocation::{Family, Invocation, Measurement, Program, Runner};
use fill_benchmark_rs::registry::MatrixRegistry;
use fill_benchmark_rs::{BenchError, Result};
use ndarray::{Array2, Array3};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::fs;
use std::path::Path;

/// Seconds per trial reported by the fake programs.
pub const REFERENCE_TRIAL: f64 = 0.05;
pub const PHIL_TRIAL: f64 = 0.002;
pub const OSKI_TRIAL: f64 = 0.004;
/// 1x1 SpMV time; an `r x c` block runs `r * c` times faster.
pub const SPMV_BASE: f64 = 0.001;

/// Fakes the external programs and records every invocation.
///
/// The exact fill is `scale * (1 + r*c/10)` for 1-based block `(r, c)`.
/// The randomized estimator overshoots it by a factor `1 + epsilon/10` and the
/// competitor by `1 + delta`, so their relative errors are `epsilon/10` and `delta`.
pub struct MockRunner {
    pub calls: RefCell<Vec<Invocation>>,
    pub reference_scale: f64,
    pub failing: Option<Program>,
}

impl MockRunner {
    pub fn new() -> Self {
        MockRunner {
            calls: RefCell::new(Vec::new()),
            reference_scale: 1.0,
            failing: None,
        }
    }

    pub fn count(&self, program: Program) -> usize {
        self.calls.borrow().iter().filter(|i| i.program() == program).count()
    }

    pub fn total(&self) -> usize {
        self.calls.borrow().len()
    }
}

pub fn exact_fill(b: usize, scale: f64) -> Array2<f64> {
    Array2::from_shape_fn((b, b), |(r, c)| scale * (1.0 + ((r + 1) * (c + 1)) as f64 / 10.0))
}

impl Runner for MockRunner {
    fn run(&self, invocation: &Invocation) -> Result<Measurement> {
        self.calls.borrow_mut().push(invocation.clone());
        let program = invocation.program();
        if self.failing == Some(program) {
            return Err(BenchError::Invocation {
                command: program.binary_name().to_string(),
                status: "exit status: 1".to_string(),
                stdout: String::new(),
                stderr: "mock failure".to_string(),
            });
        }

        let trials = invocation.trials();
        match invocation {
            Invocation::Spmv(spmv) => {
                let mean = SPMV_BASE / (spmv.rows * spmv.cols) as f64;
                Ok(Measurement {
                    time_mean: mean,
                    time_total: mean * trials as f64,
                    results: None,
                })
            }
            Invocation::Fill(fill) => {
                let (per_trial, factor) = match fill.program {
                    Program::Reference => (REFERENCE_TRIAL, 1.0),
                    Program::Estimator(Family::Phil) => (PHIL_TRIAL, 1.0 + fill.params.epsilon / 10.0),
                    Program::Estimator(Family::Oski) => (OSKI_TRIAL, 1.0 + fill.params.delta),
                    Program::Spmv => unreachable!(),
                };
                let b = fill.params.b;
                let results = fill.results.then(|| {
                    let estimate = exact_fill(b, self.reference_scale) * factor;
                    let mut batch = Array3::zeros((trials as usize, b, b));
                    for mut slot in batch.outer_iter_mut() {
                        slot.assign(&estimate);
                    }
                    batch
                });
                Ok(Measurement {
                    time_mean: per_trial,
                    time_total: per_trial * trials as f64,
                    results,
                })
            }
        }
    }
}

/// Writes a small Matrix Market file.
pub fn write_matrix(dir: &Path, name: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(
        dir.join(format!("{}.mtx", name)),
        "%%MatrixMarket matrix coordinate real general\n4 4 3\n1 1 1.0\n2 2 1.0\n4 3 2.0\n",
    )
    .unwrap();
}

/// An experiment rooted in `root` with a 2x2 block bound and one matrix `a`.
pub fn experiment(root: &Path) -> Experiment {
    let matrix_path = root.join("matrix");
    write_matrix(&matrix_path, "a");
    Experiment {
        experiment_name: "Mock".to_string(),
        data_path: root.join("data"),
        matrix_registry_path: matrix_path.join("registry.json"),
        matrix_path,
        b: 2,
        trials: 5,
        profile_m: 3,
        profile_n: 3,
        profile_trials: 2,
        lock_timeout_secs: 5,
        ..Experiment::default()
    }
}

pub fn registry(experiment: &Experiment) -> MatrixRegistry {
    MatrixRegistry::new(&experiment.matrix_path, FxHashMap::default())
}
