use clap::Parser;
use fill_benchmark_rs::cli::CommonArgs;
use fill_benchmark_rs::report::print_failures;
use fill_benchmark_rs::sweep::warm_references;
use fill_benchmark_rs::{Harness, ProcessRunner};
use std::time::Instant;

/// Computes and caches the exact fill of each matrix.
#[derive(Parser)]
#[command(name = "generate_references")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Matrices to compute references for
    #[arg(required = true)]
    matrices: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.common.init_logging();
    let start = Instant::now();

    let experiment = cli.common.experiment()?;
    let harness = Harness::new(&experiment, ProcessRunner::new(&experiment))?;

    let report = warm_references(&harness, &cli.matrices);
    print_failures(&report.failures);

    log::info!(
        "{} of {} references ready in {:.2?}",
        report.results.len(),
        cli.matrices.len(),
        start.elapsed()
    );
    if !report.failures.is_empty() {
        anyhow::bail!("{} reference(s) could not be computed", report.failures.len());
    }
    Ok(())
}
