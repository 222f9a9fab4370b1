use clap::Parser;
use fill_benchmark_rs::cli::CommonArgs;
use fill_benchmark_rs::report::{print_failures, print_points, write_json};
use fill_benchmark_rs::sweep::plot_sweep;
use fill_benchmark_rs::{Harness, ProcessRunner};
use std::time::Instant;

/// Evaluates both families at each of a matrix's plot points.
#[derive(Parser)]
#[command(name = "generate_plot_data")]
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
    if !experiment.plot_points.contains_key(&cli.matrix) {
        log::info!("no plot points configured for {}, using the default grid", cli.matrix);
    }
    let points = experiment.plot_points_for(&cli.matrix);
    let mut harness = Harness::new(&experiment, ProcessRunner::new(&experiment))?;

    let report = plot_sweep(&mut harness, &cli.matrix, &points);
    print_failures(&report.failures);

    let path = experiment.plots_dir().join(format!("{}.json", cli.matrix));
    write_json(&path, &report.results)?;
    print_points(&report.results);

    log::info!("wrote {} in {:.2?}", path.display(), start.elapsed());
    Ok(())
}
