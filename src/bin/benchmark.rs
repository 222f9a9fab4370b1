use clap::Parser;
use fill_benchmark_rs::cli::CommonArgs;
use fill_benchmark_rs::report::{append_json, print_failures, print_speedups};
use fill_benchmark_rs::sweep::speedup_sweep;
use fill_benchmark_rs::{Harness, ProcessRunner};
use std::time::Instant;

/// Times the reference and both estimators and compares their accuracy.
#[derive(Parser)]
#[command(name = "benchmark")]
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

    let report = speedup_sweep(&harness, &cli.matrices);
    print_failures(&report.failures);

    let path = experiment.experiment_dir().join("benchmark.json");
    for row in &report.results {
        append_json(row.clone(), &path)?;
    }
    print_speedups(&report.results);

    log::info!("benchmark done in {:.2?}", start.elapsed());
    Ok(())
}
