use clap::Parser;
use fill_benchmark_rs::cli::CommonArgs;
use fill_benchmark_rs::{Harness, ProcessRunner};
use prettytable::{Cell, Row, Table};
use std::time::Instant;

/// Measures the SpMV performance profile of this machine.
#[derive(Parser)]
#[command(name = "generate_profile")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.common.init_logging();
    let start = Instant::now();

    let experiment = cli.common.experiment()?;
    let mut harness = Harness::new(&experiment, ProcessRunner::new(&experiment))?;
    let profile = harness.profile(experiment.b)?;

    let mut table = Table::new();
    let mut header = vec![Cell::new("r\\c")];
    header.extend((1..=profile.ncols()).map(|c| Cell::new(&c.to_string())));
    table.add_row(Row::new(header));
    for (r, values) in profile.outer_iter().enumerate() {
        let mut cells = vec![Cell::new(&(r + 1).to_string())];
        cells.extend(values.iter().map(|v| Cell::new(&format!("{:.3}", v))));
        table.add_row(Row::new(cells));
    }
    table.printstd();

    log::info!("profile ready in {:.2?}", start.elapsed());
    Ok(())
}
