use crate::error::{BenchError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

/// Maximum relative error over all block sizes, one value per trial:
/// `max_{r,c} |E[t,r,c] - R[r,c]| / R[r,c]`.
///
/// The whole batch is evaluated with broadcast array arithmetic. The reference
/// must be strictly positive everywhere; NaN in an estimate propagates to that
/// trial's error.
pub fn max_relative_errors(estimates: ArrayView3<f64>, reference: ArrayView2<f64>) -> Result<Array1<f64>> {
    check_reference(reference)?;
    let (_, rows, cols) = estimates.dim();
    if (rows, cols) != reference.dim() {
        return Err(BenchError::Precondition(format!(
            "estimates are {}x{} but the reference is {}x{}",
            rows,
            cols,
            reference.nrows(),
            reference.ncols()
        )));
    }

    let relative = (&estimates - &reference).mapv(f64::abs) / &reference;
    let per_row = relative.map_axis(Axis(2), nan_max);
    Ok(per_row.map_axis(Axis(1), nan_max))
}

fn check_reference(reference: ArrayView2<f64>) -> Result<()> {
    if reference.is_empty() {
        return Err(BenchError::Precondition("reference fill matrix is empty".to_string()));
    }
    if let Some(((r, c), value)) = reference.indexed_iter().find(|(_, &v)| !(v > 0.0)) {
        return Err(BenchError::Precondition(format!(
            "reference fill at block ({}, {}) is {}, must be strictly positive",
            r + 1,
            c + 1,
            value
        )));
    }
    Ok(())
}

fn nan_max(values: ArrayView1<f64>) -> f64 {
    values.iter().fold(f64::NEG_INFINITY, |acc, &v| {
        if acc.is_nan() || v.is_nan() {
            f64::NAN
        } else {
            acc.max(v)
        }
    })
}

/// Distribution summary of a batch of scalars.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation.
    pub std: f64,
}

impl Summary {
    /// NaN anywhere in `values` makes every statistic NaN. An empty batch is NaN too.
    pub fn of(values: ArrayView1<f64>) -> Self {
        Summary {
            mean: mean(values),
            median: median(values),
            std: std(values),
        }
    }
}

pub fn mean(values: ArrayView1<f64>) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sum() / values.len() as f64
}

pub fn std(values: ArrayView1<f64>) -> f64 {
    let m = mean(values);
    if m.is_nan() {
        return f64::NAN;
    }
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

pub fn median(values: ArrayView1<f64>) -> f64 {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2, Array3};
    use proptest::prelude::*;

    #[test]
    fn symmetric_errors_around_reference() {
        let reference = Array2::from_elem((3, 3), 2.0);
        let mut estimates = Array3::zeros((2, 3, 3));
        estimates.index_axis_mut(Axis(0), 0).fill(3.0);
        estimates.index_axis_mut(Axis(0), 1).fill(1.0);

        let errors = max_relative_errors(estimates.view(), reference.view()).unwrap();
        assert_eq!(errors.to_vec(), vec![0.5, 0.5]);
    }

    #[test]
    fn takes_worst_block_per_trial() {
        let reference = array![[1.0, 2.0], [4.0, 8.0]];
        let estimates = Array3::from_shape_vec(
            (2, 2, 2),
            vec![1.0, 2.0, 4.0, 16.0, 1.5, 2.0, 4.0, 8.0],
        )
        .unwrap();
        let errors = max_relative_errors(estimates.view(), reference.view()).unwrap();
        assert_relative_eq!(errors[0], 1.0);
        assert_relative_eq!(errors[1], 0.5);
    }

    #[test]
    fn zero_reference_entry_is_rejected() {
        let reference = array![[1.0, 0.0], [1.0, 1.0]];
        let estimates = Array3::from_elem((1, 2, 2), 1.0);
        assert!(matches!(
            max_relative_errors(estimates.view(), reference.view()),
            Err(BenchError::Precondition(_))
        ));
    }

    #[test]
    fn negative_or_nan_reference_is_rejected() {
        let estimates = Array3::from_elem((1, 1, 1), 1.0);
        assert!(max_relative_errors(estimates.view(), array![[-1.0]].view()).is_err());
        assert!(max_relative_errors(estimates.view(), array![[f64::NAN]].view()).is_err());
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let estimates = Array3::from_elem((1, 3, 3), 1.0);
        let reference = Array2::from_elem((2, 2), 1.0);
        assert!(max_relative_errors(estimates.view(), reference.view()).is_err());
    }

    #[test]
    fn nan_estimate_propagates() {
        let reference = Array2::from_elem((2, 2), 1.0);
        let mut estimates = Array3::from_elem((2, 2, 2), 1.0);
        estimates[[0, 1, 1]] = f64::NAN;
        let errors = max_relative_errors(estimates.view(), reference.view()).unwrap();
        assert!(errors[0].is_nan());
        assert_eq!(errors[1], 0.0);
        assert!(Summary::of(errors.view()).mean.is_nan());
    }

    #[test]
    fn summary_statistics() {
        let values = array![1.0, 2.0, 3.0, 4.0];
        let summary = Summary::of(values.view());
        assert_relative_eq!(summary.mean, 2.5);
        assert_relative_eq!(summary.median, 2.5);
        assert_relative_eq!(summary.std, 1.25_f64.sqrt());

        assert_eq!(median(array![5.0, 1.0, 3.0].view()), 3.0);
        assert!(mean(Array1::<f64>::zeros(0).view()).is_nan());
    }

    proptest! {
        #[test]
        fn exact_estimates_have_zero_error(
            values in proptest::collection::vec(0.01f64..100.0, 9),
            trials in 1usize..5,
        ) {
            let reference = Array2::from_shape_vec((3, 3), values).unwrap();
            let estimates = reference
                .broadcast((trials, 3, 3))
                .unwrap()
                .to_owned();
            let errors = max_relative_errors(estimates.view(), reference.view()).unwrap();
            prop_assert!(errors.iter().all(|&e| e == 0.0));
        }

        #[test]
        fn error_is_scale_invariant(scale in 0.1f64..10.0, value in 0.1f64..10.0) {
            let reference = Array2::from_elem((2, 2), value);
            let estimates = Array3::from_elem((1, 2, 2), value * 1.5);
            let scaled_ref = reference.mapv(|v| v * scale);
            let scaled_est = estimates.mapv(|v| v * scale);
            let a = max_relative_errors(estimates.view(), reference.view()).unwrap()[0];
            let b = max_relative_errors(scaled_est.view(), scaled_ref.view()).unwrap()[0];
            prop_assert!((a - b).abs() < 1e-9);
        }
    }
}
