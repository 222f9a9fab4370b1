use clap::Parser;
use fill_benchmark_rs::cli::CommonArgs;
use fill_benchmark_rs::{Harness, ProcessRunner};
use std::time::Instant;

/// Records absolute SpMV times of each matrix at every block size.
#[derive(Parser)]
#[command(name = "generate_spmv_records")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[arg(required = true)]
    matrices: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.common.init_logging();
    let start = Instant::now();

    let experiment = cli.common.experiment()?;
    let harness = Harness::new(&experiment, ProcessRunner::new(&experiment))?;

    let mut failed = 0;
    for matrix in &cli.matrices {
        match harness.spmv_record(matrix, experiment.b) {
            Ok(record) => println!("{}: 1x1 SpMV takes {:.3e}s", matrix, record[[0, 0]]),
            Err(e) => {
                log::warn!("skipping {}: {}", matrix, e);
                failed += 1;
            }
        }
    }

    log::info!("spmv records done in {:.2?}", start.elapsed());
    if failed > 0 {
        anyhow::bail!("{} record(s) could not be computed", failed);
    }
    Ok(())
}
