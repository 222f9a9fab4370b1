use crate::config::Experiment;
use crate::error::{BenchError, Result};
use ndarray::Array3;
use rand::Rng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

/// Environment variable the external programs read their RNG seed from.
pub const SEED_VAR: &str = "GSL_RNG_SEED";

/// The two families of fill estimators under comparison.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// Randomized sampler, controlled by epsilon, delta and sigma.
    #[serde(alias = "asx")]
    Phil,
    /// Deterministic-tolerance competitor, controlled by delta alone.
    Oski,
}

impl Family {
    pub const ALL: [Family; 2] = [Family::Phil, Family::Oski];

    pub fn name(&self) -> &'static str {
        match self {
            Family::Phil => "phil",
            Family::Oski => "oski",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Family {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "phil" | "asx" => Ok(Family::Phil),
            "oski" => Ok(Family::Oski),
            _ => Err(BenchError::Config(format!("unknown estimator family: {}", s))),
        }
    }
}

/// External programs the harness knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Program {
    Reference,
    Estimator(Family),
    Spmv,
}

impl Program {
    pub fn binary_name(&self) -> &'static str {
        match self {
            Program::Reference => "reference",
            Program::Estimator(family) => family.name(),
            Program::Spmv => "spmv",
        }
    }

    fn takes_epsilon(&self) -> bool {
        matches!(self, Program::Estimator(Family::Phil))
    }

    fn takes_delta(&self) -> bool {
        matches!(self, Program::Estimator(_))
    }
}

/// A point in estimator parameter space as written in experiment descriptors.
/// Unset fields fall back to the experiment defaults.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ParameterPoint {
    #[serde(rename = "B", default, skip_serializing_if = "Option::is_none")]
    pub b: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epsilon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sigma: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trials: Option<u64>,
}

impl ParameterPoint {
    pub fn resolve(&self, experiment: &Experiment) -> FillParams {
        FillParams {
            b: self.b.unwrap_or(experiment.b),
            epsilon: self.epsilon.unwrap_or(experiment.epsilon),
            delta: self.delta.unwrap_or(experiment.delta),
            sigma: self.sigma.unwrap_or(experiment.sigma),
        }
    }

    pub fn trials_or(&self, experiment: &Experiment) -> u64 {
        self.trials.unwrap_or(experiment.trials)
    }
}

/// Fully resolved estimator parameters.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct FillParams {
    #[serde(rename = "B")]
    pub b: usize,
    pub epsilon: f64,
    pub delta: f64,
    pub sigma: f64,
}

/// One run of a fill estimator.
#[derive(Debug, Clone, PartialEq)]
pub struct FillInvocation {
    pub program: Program,
    pub matrix: PathBuf,
    pub params: FillParams,
    pub trials: u64,
    pub clock: bool,
    pub results: bool,
}

/// One run of the blocked SpMV micro-benchmark.
#[derive(Debug, Clone, PartialEq)]
pub struct SpmvInvocation {
    pub matrix: PathBuf,
    pub rows: usize,
    pub cols: usize,
    pub trials: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Fill(FillInvocation),
    Spmv(SpmvInvocation),
}

impl Invocation {
    pub fn program(&self) -> Program {
        match self {
            Invocation::Fill(fill) => fill.program,
            Invocation::Spmv(_) => Program::Spmv,
        }
    }

    pub fn trials(&self) -> u64 {
        match self {
            Invocation::Fill(fill) => fill.trials,
            Invocation::Spmv(spmv) => spmv.trials,
        }
    }

    pub fn matrix(&self) -> &Path {
        match self {
            Invocation::Fill(fill) => &fill.matrix,
            Invocation::Spmv(spmv) => &spmv.matrix,
        }
    }

    /// The same invocation with a different trial count.
    pub fn with_trials(&self, trials: u64) -> Self {
        let mut next = self.clone();
        match &mut next {
            Invocation::Fill(fill) => fill.trials = trials,
            Invocation::Spmv(spmv) => spmv.trials = trials,
        }
        next
    }

    /// Block bound the results must have, when results were asked for.
    fn expected_block_bound(&self) -> Option<usize> {
        match self {
            Invocation::Fill(fill) if fill.results => Some(fill.params.b),
            _ => None,
        }
    }

    /// Argument list after the program name.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        match self {
            Invocation::Fill(fill) => {
                args.push("-B".to_string());
                args.push(fill.params.b.to_string());
                if fill.program.takes_epsilon() {
                    args.push("-e".to_string());
                    args.push(fill.params.epsilon.to_string());
                }
                if fill.program.takes_delta() {
                    args.push("-d".to_string());
                    args.push(fill.params.delta.to_string());
                }
                if fill.program.takes_epsilon() {
                    args.push("-s".to_string());
                    args.push(fill.params.sigma.to_string());
                }
                args.push("-t".to_string());
                args.push(fill.trials.to_string());
                args.push(if fill.clock { "-c" } else { "-C" }.to_string());
                args.push(if fill.results { "-r" } else { "-R" }.to_string());
                args.push(fill.matrix.display().to_string());
            }
            Invocation::Spmv(spmv) => {
                args.push("-r".to_string());
                args.push(spmv.rows.to_string());
                args.push("-c".to_string());
                args.push(spmv.cols.to_string());
                args.push("-t".to_string());
                args.push(spmv.trials.to_string());
                args.push(spmv.matrix.display().to_string());
            }
        }
        args
    }
}

/// Parsed output of one external invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Seconds per trial.
    pub time_mean: f64,
    /// Seconds for the whole invocation.
    pub time_total: f64,
    /// One `B×B` fill estimate per trial, shape `(trials, B, B)`.
    pub results: Option<Array3<f64>>,
}

#[derive(Deserialize)]
struct RawMeasurement {
    time_mean: f64,
    time_total: f64,
    #[serde(default)]
    results: Option<Vec<Vec<Vec<f64>>>>,
}

/// Parses the JSON an external program printed and densifies its result matrices.
pub fn parse_measurement(command: &str, stdout: &str, block_bound: Option<usize>) -> Result<Measurement> {
    let raw: RawMeasurement =
        serde_json::from_str(stdout).map_err(|source| BenchError::MalformedOutput {
            command: command.to_string(),
            output: stdout.to_string(),
            source,
        })?;

    let bad = |detail: String| BenchError::BadResults {
        command: command.to_string(),
        detail,
    };

    let results = match (raw.results, block_bound) {
        (Some(trials), Some(b)) => {
            if trials.is_empty() {
                return Err(bad("no trials in results".to_string()));
            }
            let mut flat = Vec::with_capacity(trials.len() * b * b);
            for (t, estimate) in trials.iter().enumerate() {
                if estimate.len() != b || estimate.iter().any(|row| row.len() != b) {
                    return Err(bad(format!("trial {} is not a {}x{} matrix", t, b, b)));
                }
                flat.extend(estimate.iter().flatten().copied());
            }
            let dense = Array3::from_shape_vec((trials.len(), b, b), flat)
                .map_err(|e| bad(e.to_string()))?;
            Some(dense)
        }
        (None, Some(_)) => return Err(bad("results were requested but not printed".to_string())),
        (_, None) => None,
    };

    Ok(Measurement {
        time_mean: raw.time_mean,
        time_total: raw.time_total,
        results,
    })
}

/// Anything that can execute an invocation. The process runner is the real one;
/// tests substitute their own.
pub trait Runner {
    fn run(&self, invocation: &Invocation) -> Result<Measurement>;
}

impl<R: Runner + ?Sized> Runner for &R {
    fn run(&self, invocation: &Invocation) -> Result<Measurement> {
        (**self).run(invocation)
    }
}

/// Runs external programs as blocking subprocesses.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    bin_path: PathBuf,
    fill_prefix: Vec<String>,
    fill_vars: FxHashMap<String, String>,
    spmv_prefix: Vec<String>,
    spmv_vars: FxHashMap<String, String>,
}

impl ProcessRunner {
    pub fn new(experiment: &Experiment) -> Self {
        ProcessRunner {
            bin_path: experiment.bin_path.clone(),
            fill_prefix: split_prefix(&experiment.fill_prefix),
            fill_vars: experiment.fill_vars.clone(),
            spmv_prefix: split_prefix(&experiment.spmv_prefix),
            spmv_vars: experiment.spmv_vars.clone(),
        }
    }

    fn command_line(&self, invocation: &Invocation) -> (Vec<String>, &FxHashMap<String, String>) {
        let (prefix, vars) = match invocation {
            Invocation::Fill(_) => (&self.fill_prefix, &self.fill_vars),
            Invocation::Spmv(_) => (&self.spmv_prefix, &self.spmv_vars),
        };
        let mut line = prefix.clone();
        line.push(
            self.bin_path
                .join(invocation.program().binary_name())
                .display()
                .to_string(),
        );
        line.extend(invocation.args());
        (line, vars)
    }
}

impl Runner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<Measurement> {
        let (line, vars) = self.command_line(invocation);
        let display = line.join(" ");
        log::debug!("{}", display);

        // Seed first so a configured overlay can still pin it.
        let mut command = Command::new(&line[0]);
        command.args(&line[1..]);
        command.env(SEED_VAR, fresh_seed().to_string());
        command.envs(vars);

        let output = command.output().map_err(|source| BenchError::Spawn {
            command: display.clone(),
            source,
        })?;

        // A failed run is fatal whatever it printed.
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            return Err(BenchError::Invocation {
                command: display,
                status: output.status.to_string(),
                stdout: stdout.into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        parse_measurement(&display, &stdout, invocation.expected_block_bound())
    }
}

fn split_prefix(prefix: &str) -> Vec<String> {
    prefix.split_whitespace().map(str::to_string).collect()
}

/// A new seed for every external process so trials never share a random stream.
pub fn fresh_seed() -> u64 {
    rand::thread_rng().gen_range(0..i64::MAX as u64)
}
