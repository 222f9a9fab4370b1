use anyhow::Context;
use clap::Parser;
use fill_benchmark_rs::cli::CommonArgs;
use fill_benchmark_rs::report::{print_failures, print_table, write_json};
use fill_benchmark_rs::sweep::table_sweep;
use fill_benchmark_rs::{Harness, ProcessRunner};
use std::time::Instant;

/// Evaluates both estimator families on one matrix at the table points.
#[derive(Parser)]
#[command(name = "generate_table_data")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// The matrix to use
    matrix: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.common.init_logging();
    let start = Instant::now();

    let experiment = cli.common.experiment()?;
    let mut harness = Harness::new(&experiment, ProcessRunner::new(&experiment))?;

    let report = table_sweep(&mut harness, std::slice::from_ref(&cli.matrix));
    print_failures(&report.failures);
    let row = report
        .results
        .first()
        .with_context(|| format!("no table row for {}", cli.matrix))?;

    let path = experiment.table_dir().join(format!("{}.json", cli.matrix));
    write_json(&path, row)?;
    print_table(&report.results);

    log::info!("wrote {} in {:.2?}", path.display(), start.elapsed());
    Ok(())
}
