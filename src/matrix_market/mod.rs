//! Just enough Matrix Market handling for the harness: reading the size line of
//! a coordinate file and writing the synthetic dense matrix the profile is
//! measured on. Estimators and the SpMV benchmark parse matrices themselves.

use crate::cache::partial_path;
use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixShape {
    pub rows: usize,
    pub cols: usize,
    pub nnz: usize,
}

/// Reads the dimensions line that follows the banner and comments.
pub fn read_shape<P: AsRef<Path>>(path: P) -> Result<MatrixShape> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('%') {
            continue;
        }

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        if parts.len() != 3 {
            break;
        }
        let parse = |s: &str| {
            s.parse::<usize>().map_err(|_| {
                BenchError::Precondition(format!("invalid Matrix Market header in {}", path.display()))
            })
        };
        return Ok(MatrixShape {
            rows: parse(parts[0])?,
            cols: parse(parts[1])?,
            nnz: parse(parts[2])?,
        });
    }

    Err(BenchError::Precondition(format!(
        "invalid Matrix Market header in {}",
        path.display()
    )))
}

/// Writes an all-ones `rows × cols` matrix in coordinate format, through a
/// temporary file so a crash never leaves a truncated matrix behind.
pub fn write_dense<P: AsRef<Path>>(path: P, rows: usize, cols: usize) -> Result<()> {
    let path = path.as_ref();
    let tmp = partial_path(path);
    {
        let mut out = BufWriter::new(File::create(&tmp)?);
        writeln!(out, "%%MatrixMarket matrix coordinate real general")?;
        writeln!(out, "{} {} {}", rows, cols, rows * cols)?;
        for i in 1..=rows {
            for j in 1..=cols {
                writeln!(out, "{} {} 1", i, j)?;
            }
        }
        out.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_matrix_header_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dense_3_4.mtx");
        write_dense(&path, 3, 4).unwrap();

        let shape = read_shape(&path).unwrap();
        assert_eq!(shape, MatrixShape { rows: 3, cols: 4, nnz: 12 });

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2 + 12);
        assert!(content.ends_with("3 4 1\n"));
    }

    #[test]
    fn dense_write_uses_a_per_process_scratch_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dense_2_2.mtx");
        let tmp = partial_path(&path);
        assert_eq!(
            tmp.file_name().unwrap().to_str().unwrap(),
            format!("dense_2_2.mtx.{}.partial", std::process::id())
        );

        // Leftovers of another writer do not disturb this one.
        let other = dir.path().join("dense_2_2.mtx.0.partial");
        fs::write(&other, "truncated").unwrap();
        write_dense(&path, 2, 2).unwrap();
        assert!(!tmp.exists());
        assert_eq!(fs::read_to_string(&other).unwrap(), "truncated");
        assert_eq!(read_shape(&path).unwrap().nnz, 4);
    }

    #[test]
    fn skips_comments_before_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.mtx");
        fs::write(&path, "%%MatrixMarket matrix coordinate pattern general\n% note\n\n5 6 7\n1 1\n").unwrap();
        assert_eq!(read_shape(&path).unwrap().nnz, 7);
    }

    #[test]
    fn rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.mtx");
        fs::write(&path, "not a matrix\n").unwrap();
        assert!(read_shape(&path).is_err());
    }
}
