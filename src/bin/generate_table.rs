use clap::Parser;
use fill_benchmark_rs::cli::CommonArgs;
use fill_benchmark_rs::report::{load_table_rows, print_table, write_json};
use std::time::Instant;

/// Gathers the per-matrix table data into one table.
#[derive(Parser)]
#[command(name = "generate_table")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.common.init_logging();
    let start = Instant::now();

    let experiment = cli.common.experiment()?;
    let rows = load_table_rows(&experiment.table_dir())?;

    let missing: Vec<&String> = experiment
        .table_matrices
        .iter()
        .filter(|m| !rows.iter().any(|r| &r.info.matrix == *m))
        .collect();
    for matrix in &missing {
        log::warn!("no table data for {}", matrix);
    }

    let path = experiment.experiment_dir().join("table.json");
    write_json(&path, &rows)?;
    print_table(&rows);

    log::info!("{} rows written to {} in {:.2?}", rows.len(), path.display(), start.elapsed());
    Ok(())
}
