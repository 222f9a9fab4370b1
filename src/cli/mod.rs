//! Arguments and start-up shared by every binary.

use crate::affinity::set_affinity;
use crate::config::Experiment;
use crate::error::Result;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Experiment descriptor (JSON). Defaults apply when omitted.
    #[arg(short = 'e', long = "experiment", value_name = "FILE")]
    pub experiment: Option<PathBuf>,

    /// Log every external command.
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl CommonArgs {
    pub fn init_logging(&self) {
        let level = if self.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        let _ = env_logger::Builder::new()
            .filter_level(level)
            .parse_default_env()
            .try_init();
    }

    /// Loads the experiment and applies its process-wide settings.
    pub fn experiment(&self) -> Result<Experiment> {
        let experiment = match &self.experiment {
            Some(path) => Experiment::load(path)?,
            None => Experiment::default(),
        };
        log::info!("experiment {} in {}", experiment.experiment_name, experiment.experiment_dir().display());
        if let Some(core) = experiment.pin_core {
            set_affinity(core)?;
        }
        Ok(experiment)
    }
}
