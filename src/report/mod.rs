use crate::error::Result;
use crate::invocation::Family;
use crate::metrics;
use crate::sweep::{MatrixRow, PointSummary, SpeedupRow, SweepFailure};
use ndarray::Array1;
use prettytable::{row, Table};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Writes `value` as pretty JSON, creating parent directories.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Appends `row` to the JSON array stored at `path`, starting a new array if
/// the file does not exist yet.
pub fn append_json<T: Serialize + DeserializeOwned>(row: T, path: &Path) -> Result<()> {
    let mut rows: Vec<T> = if path.exists() {
        read_json(path)?
    } else {
        Vec::new()
    };
    rows.push(row);
    write_json(path, &rows)
}

/// Loads every per-matrix row from a table directory, sorted by matrix.
pub fn load_table_rows(dir: &Path) -> Result<Vec<MatrixRow>> {
    let mut rows = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map(|ext| ext == "json").unwrap_or(false) {
            let row: MatrixRow = read_json(&path)?;
            rows.push(row);
        }
    }
    rows.sort_by(|a, b| a.info.matrix.cmp(&b.info.matrix));
    Ok(rows)
}

fn sci(value: f64) -> String {
    format!("{:.3e}", value)
}

fn cell(summary: Option<&PointSummary>, f: impl Fn(&PointSummary) -> f64) -> String {
    summary.map(|s| format!("{:.4}", f(s))).unwrap_or_else(|| "-".to_string())
}

fn column_mean<'r>(rows: impl Iterator<Item = Option<&'r PointSummary>>, f: impl Fn(&PointSummary) -> f64) -> String {
    let values: Array1<f64> = rows.flatten().map(f).collect();
    if values.is_empty() {
        "-".to_string()
    } else {
        format!("{:.4}", metrics::mean(values.view()))
    }
}

pub fn print_table(rows: &[MatrixRow]) {
    let mut table = Table::new();
    table.add_row(row![
        "Matrix",
        "Domain",
        "Rows",
        "Cols",
        "NNZ",
        "1x1 SpMV (s)",
        "PHIL Time",
        "PHIL Error",
        "PHIL SpMV",
        "OSKI Time",
        "OSKI Error",
        "OSKI SpMV"
    ]);

    for r in rows {
        let phil = r.summary(Family::Phil);
        let oski = r.summary(Family::Oski);
        table.add_row(row![
            &r.info.matrix,
            &r.info.matrix_domain,
            r.info.matrix_rows,
            r.info.matrix_cols,
            r.info.matrix_nnz,
            sci(r.normal_spmv_time),
            cell(phil, |s| s.normalized_time),
            cell(phil, |s| s.mean_error),
            cell(phil, |s| s.mean_spmv_time),
            cell(oski, |s| s.normalized_time),
            cell(oski, |s| s.mean_error),
            cell(oski, |s| s.mean_spmv_time),
        ]);
    }

    let phil = || rows.iter().map(|r| r.summary(Family::Phil));
    let oski = || rows.iter().map(|r| r.summary(Family::Oski));
    table.add_row(row![
        "AVERAGE",
        "",
        "",
        "",
        "",
        "",
        column_mean(phil(), |s| s.normalized_time),
        column_mean(phil(), |s| s.mean_error),
        column_mean(phil(), |s| s.mean_spmv_time),
        column_mean(oski(), |s| s.normalized_time),
        column_mean(oski(), |s| s.mean_error),
        column_mean(oski(), |s| s.mean_spmv_time),
    ]);

    table.printstd();
}

pub fn print_points(points: &[PointSummary]) {
    let mut table = Table::new();
    table.add_row(row![
        "Family",
        "B",
        "Epsilon",
        "Delta",
        "Time (s)",
        "Norm Time",
        "Mean Error",
        "Median Error",
        "Std Error",
        "Norm SpMV"
    ]);
    let opt = |v: Option<f64>| v.map(|x| format!("{:.4}", x)).unwrap_or_else(|| "-".to_string());
    for p in points {
        table.add_row(row![
            p.family,
            p.point.b.map(|b| b.to_string()).unwrap_or_else(|| "-".to_string()),
            opt(p.point.epsilon),
            opt(p.point.delta),
            sci(p.mean_time),
            format!("{:.4}", p.normalized_time),
            format!("{:.4}", p.mean_error),
            format!("{:.4}", p.median_error),
            format!("{:.4}", p.std_error),
            format!("{:.4}", p.mean_spmv_time),
        ]);
    }
    table.printstd();
}

pub fn print_speedups(rows: &[SpeedupRow]) {
    let mut table = Table::new();
    table.add_row(row![
        "Matrix",
        "Reference (s)",
        "OSKI (s)",
        "PHIL (s)",
        "PHIL/OSKI",
        "PHIL/Reference",
        "PHIL Median Err",
        "OSKI Median Err",
        "PHIL Mean Err",
        "OSKI Mean Err"
    ]);
    for r in rows {
        table.add_row(row![
            &r.matrix,
            sci(r.reference_time),
            sci(r.oski_time),
            sci(r.phil_time),
            format!("{:.2}", r.phil_oski_speedup),
            format!("{:.2}", r.phil_reference_speedup),
            format!("{:.4}", r.phil_median_error),
            format!("{:.4}", r.oski_median_error),
            format!("{:.4}", r.phil_mean_error),
            format!("{:.4}", r.oski_mean_error),
        ]);
    }

    if !rows.is_empty() {
        let avg = |f: fn(&SpeedupRow) -> f64| {
            let values: Array1<f64> = rows.iter().map(f).collect();
            metrics::mean(values.view())
        };
        table.add_row(row![
            "AVERAGE",
            sci(avg(|r| r.reference_time)),
            sci(avg(|r| r.oski_time)),
            sci(avg(|r| r.phil_time)),
            format!("{:.2}", avg(|r| r.phil_oski_speedup)),
            format!("{:.2}", avg(|r| r.phil_reference_speedup)),
            format!("{:.4}", avg(|r| r.phil_median_error)),
            format!("{:.4}", avg(|r| r.oski_median_error)),
            format!("{:.4}", avg(|r| r.phil_mean_error)),
            format!("{:.4}", avg(|r| r.oski_mean_error)),
        ]);
    }
    table.printstd();
}

/// Prints skipped units to stderr. Nothing is printed when there are none.
pub fn print_failures(failures: &[SweepFailure]) {
    if failures.is_empty() {
        return;
    }
    eprintln!("\n{} unit(s) failed:", failures.len());
    for f in failures {
        match f.family {
            Some(family) => eprintln!("  {} ({}): {}", f.matrix, family, f.message),
            None => eprintln!("  {}: {}", f.matrix, f.message),
        }
    }
}
