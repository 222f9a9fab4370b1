use std::path::PathBuf;
use thiserror::Error;

/// Everything that can abort one unit of harness work.
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("artifact encoding error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    Invocation {
        command: String,
        status: String,
        stdout: String,
        stderr: String,
    },
    #[error("output of `{command}` is not a valid measurement ({source}). Got:\n{output}")]
    MalformedOutput {
        command: String,
        output: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("results of `{command}` are unusable: {detail}")]
    BadResults { command: String, detail: String },
    #[error("precondition violated: {0}")]
    Precondition(String),
    #[error("could not reach a stable timing: {trials} trials took {total_time}s, need {min_wall_time}s")]
    Unstable {
        trials: u64,
        total_time: f64,
        min_wall_time: f64,
    },
    #[error("parameter search did not leave the error bracket after {steps} steps (last value {value})")]
    SearchDiverged { steps: usize, value: f64 },
    #[error("estimator error is not monotone in the parameter ({reversals} reversals, last at {value})")]
    NonMonotone { reversals: usize, value: f64 },
    #[error("timed out waiting for lock {0}")]
    LockTimeout(PathBuf),
    #[error("invalid experiment configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BenchError>;
