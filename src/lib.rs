pub mod affinity;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod harness;
pub mod invocation;
pub mod matrix_market;
pub mod metrics;
pub mod registry;
pub mod report;
pub mod selection;
pub mod sweep;
pub mod trials;

pub use config::Experiment;
pub use error::{BenchError, Result};
pub use harness::Harness;
pub use invocation::{Family, ParameterPoint, ProcessRunner, Runner};
