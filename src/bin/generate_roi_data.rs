use clap::Parser;
use fill_benchmark_rs::cli::CommonArgs;
use fill_benchmark_rs::report::{print_points, write_json};
use fill_benchmark_rs::sweep::roi_curve;
use fill_benchmark_rs::{Harness, ProcessRunner};
use std::time::Instant;

/// Searches accuracy/time trade-off curves for each configured family.
#[derive(Parser)]
#[command(name = "generate_roi_data")]
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

    let mut failed = 0;
    for config in &experiment.roi {
        match roi_curve(&mut harness, &cli.matrix, config) {
            Ok(points) => {
                let path = experiment
                    .roi_dir()
                    .join(format!("{}_{}.json", cli.matrix, config.family));
                write_json(&path, &points)?;
                println!("\nROI for {} ({} points)", config.family, points.len());
                print_points(&points);
            }
            Err(e) => {
                log::warn!("roi search for {} on {} failed: {}", config.family, cli.matrix, e);
                failed += 1;
            }
        }
    }

    log::info!("roi data done in {:.2?}", start.elapsed());
    if failed > 0 {
        anyhow::bail!("{} roi search(es) failed", failed);
    }
    Ok(())
}
