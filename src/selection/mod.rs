use crate::error::{BenchError, Result};
use ndarray::{Array2, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense block dimensions, counted from 1.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockSize {
    pub rows: usize,
    pub cols: usize,
}

impl BlockSize {
    /// Position of this block size in a `B×B` profile or record.
    pub fn index(&self) -> (usize, usize) {
        (self.rows - 1, self.cols - 1)
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// Chooses the block size with the highest predicted throughput,
/// `profile[r,c] / max(fill[r,c], fill_floor)`.
///
/// Ties go to the first block in row-major order. Fill entries below
/// `fill_floor` (zero included) are raised to it; NaN fill is rejected.
pub fn select_block_size(
    fill: ArrayView2<f64>,
    profile: ArrayView2<f64>,
    fill_floor: f64,
) -> Result<BlockSize> {
    if fill.dim() != profile.dim() {
        return Err(BenchError::Precondition(format!(
            "fill estimate is {}x{} but the profile is {}x{}",
            fill.nrows(),
            fill.ncols(),
            profile.nrows(),
            profile.ncols()
        )));
    }
    if fill.is_empty() {
        return Err(BenchError::Precondition("fill estimate is empty".to_string()));
    }
    if fill.iter().chain(profile.iter()).any(|v| v.is_nan()) {
        return Err(BenchError::Precondition(
            "fill estimate or profile contains NaN".to_string(),
        ));
    }

    let weight: Array2<f64> = &profile / &fill.mapv(|f| f.max(fill_floor));

    let mut best = (0, 0);
    let mut best_value = f64::NEG_INFINITY;
    for ((r, c), &value) in weight.indexed_iter() {
        if value > best_value {
            best = (r, c);
            best_value = value;
        }
    }

    Ok(BlockSize {
        rows: best.0 + 1,
        cols: best.1 + 1,
    })
}

/// One selection per trial of a `(trials, B, B)` batch.
pub fn select_block_sizes(
    estimates: ArrayView3<f64>,
    profile: ArrayView2<f64>,
    fill_floor: f64,
) -> Result<Vec<BlockSize>> {
    estimates
        .axis_iter(Axis(0))
        .map(|fill| select_block_size(fill, profile, fill_floor))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    #[test]
    fn uniform_fill_follows_the_profile() {
        let profile = array![[1.0, 2.0], [3.0, 4.0]];
        let fill = array![[1.0, 1.0], [1.0, 1.0]];
        let block = select_block_size(fill.view(), profile.view(), 1e-12).unwrap();
        assert_eq!(block, BlockSize { rows: 2, cols: 2 });
        assert_eq!(block.index(), (1, 1));
        assert_eq!(block.to_string(), "2x2");
    }

    #[test]
    fn high_fill_makes_a_block_unattractive() {
        let profile = array![[1.0, 2.0], [3.0, 4.0]];
        let fill = array![[1.0, 1.0], [1.0, 8.0]];
        let block = select_block_size(fill.view(), profile.view(), 1e-12).unwrap();
        assert_eq!(block, BlockSize { rows: 2, cols: 1 });
    }

    #[test]
    fn ties_go_to_first_in_row_major_order() {
        let profile = array![[1.0, 3.0], [3.0, 1.0]];
        let fill = Array2::from_elem((2, 2), 1.0);
        let block = select_block_size(fill.view(), profile.view(), 1e-12).unwrap();
        assert_eq!(block, BlockSize { rows: 1, cols: 2 });
    }

    #[test]
    fn zero_fill_is_clamped_not_infinite() {
        let profile = array![[1.0, 5.0], [1.0, 1.0]];
        let fill = array![[0.0, 0.0], [1.0, 1.0]];
        // Both zero entries clamp to the same floor, so the larger profile wins.
        let block = select_block_size(fill.view(), profile.view(), 1e-6).unwrap();
        assert_eq!(block, BlockSize { rows: 1, cols: 2 });
    }

    #[test]
    fn nan_and_shape_mismatch_are_rejected() {
        let profile = array![[1.0, 2.0], [3.0, 4.0]];
        let nan_fill = array![[1.0, f64::NAN], [1.0, 1.0]];
        assert!(select_block_size(nan_fill.view(), profile.view(), 1e-12).is_err());
        let small = array![[1.0]];
        assert!(select_block_size(small.view(), profile.view(), 1e-12).is_err());
    }

    #[test]
    fn selects_per_trial() {
        let profile = array![[1.0, 2.0], [3.0, 4.0]];
        let mut estimates = Array3::from_elem((2, 2, 2), 1.0);
        estimates[[1, 1, 1]] = 100.0;
        estimates[[1, 1, 0]] = 100.0;
        let blocks = select_block_sizes(estimates.view(), profile.view(), 1e-12).unwrap();
        assert_eq!(
            blocks,
            vec![BlockSize { rows: 2, cols: 2 }, BlockSize { rows: 1, cols: 2 }]
        );
    }
}
