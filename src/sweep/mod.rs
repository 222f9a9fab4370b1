use crate::config::{RoiConfig, SearchParameter};
use crate::error::{BenchError, Result};
use crate::harness::{FillRun, Harness};
use crate::invocation::{Family, ParameterPoint, Program, Runner};
use crate::matrix_market;
use crate::metrics::{self, max_relative_errors, Summary};
use crate::registry::MatrixIdentity;
use crate::selection::select_block_sizes;
use crate::trials::StableTime;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Identity and header metadata of a benchmark matrix.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MatrixInfo {
    pub matrix: String,
    pub matrix_name: String,
    pub matrix_domain: String,
    pub matrix_size: u64,
    pub matrix_rows: usize,
    pub matrix_cols: usize,
    pub matrix_nnz: usize,
}

impl MatrixInfo {
    pub fn read(identity: &MatrixIdentity) -> Result<Self> {
        let shape = matrix_market::read_shape(&identity.path)?;
        Ok(MatrixInfo {
            matrix: identity.key.clone(),
            matrix_name: identity.name.clone(),
            matrix_domain: identity.domain.clone(),
            matrix_size: identity.size,
            matrix_rows: shape.rows,
            matrix_cols: shape.cols,
            matrix_nnz: shape.nnz,
        })
    }
}

/// Accuracy and cost of one estimator family at one parameter point.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PointSummary {
    pub matrix: String,
    pub family: Family,
    pub point: ParameterPoint,
    /// Seconds per estimate, from adaptive timing.
    pub mean_time: f64,
    /// Trial count of the batch that set `mean_time`.
    pub trials_timed: u64,
    /// `mean_time` over the matrix's 1x1 SpMV time.
    pub normalized_time: f64,
    pub mean_error: f64,
    pub median_error: f64,
    pub std_error: f64,
    /// SpMV time at each selected block size over the 1x1 SpMV time.
    pub mean_spmv_time: f64,
    pub std_spmv_time: f64,
}

/// A unit of work the driver gave up on.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SweepFailure {
    pub matrix: String,
    pub family: Option<Family>,
    pub point: Option<ParameterPoint>,
    pub message: String,
}

/// One table row: a matrix and both families at their table points.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MatrixRow {
    #[serde(flatten)]
    pub info: MatrixInfo,
    pub normal_spmv_time: f64,
    pub phil: Option<PointSummary>,
    pub oski: Option<PointSummary>,
}

impl MatrixRow {
    pub fn summary(&self, family: Family) -> Option<&PointSummary> {
        match family {
            Family::Phil => self.phil.as_ref(),
            Family::Oski => self.oski.as_ref(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SweepReport<T> {
    pub results: Vec<T>,
    pub failures: Vec<SweepFailure>,
}

impl<T> Default for SweepReport<T> {
    fn default() -> Self {
        SweepReport {
            results: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> SweepReport<T> {
    fn fail(&mut self, matrix: &str, family: Option<Family>, point: Option<&ParameterPoint>, err: BenchError) {
        log::warn!(
            "skipping {}{}: {}",
            matrix,
            family.map(|f| format!(" ({})", f)).unwrap_or_default(),
            err
        );
        self.failures.push(SweepFailure {
            matrix: matrix.to_string(),
            family,
            point: point.cloned(),
            message: err.to_string(),
        });
    }
}

/// Timed, scored estimates of one family at one point.
pub struct PointMeasurement {
    pub time: StableTime,
    pub run: FillRun,
    pub errors: Array1<f64>,
}

/// Adaptive timing plus one batch of estimates scored against the reference.
pub fn measure_point<R: Runner>(
    harness: &Harness<'_, R>,
    family: Family,
    identity: &MatrixIdentity,
    point: &ParameterPoint,
) -> Result<PointMeasurement> {
    let experiment = harness.experiment();
    let program = Program::Estimator(family);
    let params = point.resolve(experiment);
    let trials = point.trials_or(experiment);

    let time = harness.stable_time(program, &identity.path, params)?;
    let run = harness.fill_estimates(program, &identity.path, params, trials)?;
    let reference = harness.reference(&identity.key, params.b)?;
    let errors = max_relative_errors(run.estimates.view(), reference.view())?;

    Ok(PointMeasurement { time, run, errors })
}

/// Measures one point and follows each estimate through block selection to
/// the SpMV time it would buy.
pub fn evaluate_point<R: Runner>(
    harness: &mut Harness<'_, R>,
    family: Family,
    matrix: &str,
    point: &ParameterPoint,
) -> Result<PointSummary> {
    let identity = harness.matrix(matrix)?;
    let measured = measure_point(harness, family, &identity, point)?;
    let b = measured.run.params.b;

    let profile = harness.profile(b)?;
    let record = harness.spmv_record(matrix, b)?;
    let base = record[[0, 0]];

    let blocks = select_block_sizes(
        measured.run.estimates.view(),
        profile.view(),
        harness.experiment().fill_floor,
    )?;
    let spmv_times: Array1<f64> = blocks.iter().map(|block| record[block.index()] / base).collect();
    let errors = Summary::of(measured.errors.view());

    log::info!(
        "{} {}: {:.3e}s per estimate, mean max error {:.4}",
        matrix,
        family,
        measured.time.mean_time,
        errors.mean
    );

    Ok(PointSummary {
        matrix: matrix.to_string(),
        family,
        point: point.clone(),
        mean_time: measured.time.mean_time,
        trials_timed: measured.time.trials,
        normalized_time: measured.time.mean_time / base,
        mean_error: errors.mean,
        median_error: errors.median,
        std_error: errors.std,
        mean_spmv_time: metrics::mean(spmv_times.view()),
        std_spmv_time: metrics::std(spmv_times.view()),
    })
}

/// Table rows for `matrices`. A failing matrix or family is recorded and skipped.
pub fn table_sweep<R: Runner>(harness: &mut Harness<'_, R>, matrices: &[String]) -> SweepReport<MatrixRow> {
    let mut report = SweepReport::default();
    for matrix in matrices {
        match table_row(harness, matrix, &mut report) {
            Ok(row) => report.results.push(row),
            Err(e) => report.fail(matrix, None, None, e),
        }
    }
    report
}

fn table_row<R: Runner>(
    harness: &mut Harness<'_, R>,
    matrix: &str,
    report: &mut SweepReport<MatrixRow>,
) -> Result<MatrixRow> {
    let experiment = harness.experiment();
    let info = MatrixInfo::read(&harness.matrix(matrix)?)?;
    let record = harness.spmv_record(matrix, experiment.b)?;

    let mut row = MatrixRow {
        info,
        normal_spmv_time: record[[0, 0]],
        phil: None,
        oski: None,
    };
    for family in Family::ALL {
        let point = experiment.table_point(family);
        match evaluate_point(harness, family, matrix, point) {
            Ok(summary) => match family {
                Family::Phil => row.phil = Some(summary),
                Family::Oski => row.oski = Some(summary),
            },
            Err(e) => report.fail(matrix, Some(family), Some(point), e),
        }
    }
    Ok(row)
}

/// Both families at every point, one summary per (point, family).
pub fn plot_sweep<R: Runner>(
    harness: &mut Harness<'_, R>,
    matrix: &str,
    points: &[ParameterPoint],
) -> SweepReport<PointSummary> {
    let mut report = SweepReport::default();
    for point in points {
        for family in Family::ALL {
            match evaluate_point(harness, family, matrix, point) {
                Ok(summary) => report.results.push(summary),
                Err(e) => report.fail(matrix, Some(family), Some(point), e),
            }
        }
    }
    report
}

/// Walks `config.parameter` geometrically from `config.init` until the mean
/// error leaves `[low_error, high_error]` on both sides.
///
/// Error is expected to grow with the parameter. A step that moves the error
/// the other way counts as a reversal. The result is sorted by parameter value.
pub fn roi_search<F>(config: &RoiConfig, mut evaluate: F) -> Result<Vec<(f64, PointSummary)>>
where
    F: FnMut(f64) -> Result<PointSummary>,
{
    let first = evaluate(config.init)?;
    check_error(config.init, first.mean_error)?;
    let init_error = first.mean_error;
    let mut points = vec![(config.init, first)];
    let mut reversals = 0;

    // Walk up until the error clears the band, then down from the start.
    for upward in [true, false] {
        let mut value = config.init;
        let mut last_error = init_error;
        let mut steps = 0;
        loop {
            let done = if upward {
                last_error > config.high_error
            } else {
                last_error < config.low_error
            };
            if done {
                break;
            }
            if steps == config.max_steps {
                return Err(BenchError::SearchDiverged { steps, value });
            }
            steps += 1;
            value = if upward { value * config.rate } else { value / config.rate };

            let summary = evaluate(value)?;
            let error = summary.mean_error;
            check_error(value, error)?;
            // Error should grow with the parameter.
            if (upward && error < last_error) || (!upward && error > last_error) {
                reversals += 1;
                if reversals > config.max_reversals {
                    return Err(BenchError::NonMonotone { reversals, value });
                }
            }
            last_error = error;
            points.push((value, summary));
        }
    }

    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(points)
}

fn check_error(value: f64, error: f64) -> Result<()> {
    if error.is_nan() {
        return Err(BenchError::Precondition(format!("mean error at parameter {} is NaN", value)));
    }
    Ok(())
}

/// ROI curve of one family on `matrix`, searching around its table point.
pub fn roi_curve<R: Runner>(
    harness: &mut Harness<'_, R>,
    matrix: &str,
    config: &RoiConfig,
) -> Result<Vec<PointSummary>> {
    let base = harness.experiment().table_point(config.family).clone();
    let points = roi_search(config, |value| {
        let mut point = base.clone();
        match config.parameter {
            SearchParameter::Epsilon => point.epsilon = Some(value),
            SearchParameter::Delta => point.delta = Some(value),
        }
        evaluate_point(harness, config.family, matrix, &point)
    })?;
    Ok(points.into_iter().map(|(_, summary)| summary).collect())
}

/// Estimator speed and accuracy against the exact reference on one matrix.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SpeedupRow {
    pub matrix: String,
    pub reference_time: f64,
    pub oski_time: f64,
    pub phil_time: f64,
    pub phil_oski_speedup: f64,
    pub phil_reference_speedup: f64,
    pub phil_median_error: f64,
    pub oski_median_error: f64,
    pub phil_mean_error: f64,
    pub oski_mean_error: f64,
}

pub fn speedup<R: Runner>(harness: &Harness<'_, R>, matrix: &str) -> Result<SpeedupRow> {
    let experiment = harness.experiment();
    let identity = harness.matrix(matrix)?;
    let reference_params = ParameterPoint::default().resolve(experiment);
    let reference = harness.stable_time(Program::Reference, &identity.path, reference_params)?;

    let phil = measure_point(harness, Family::Phil, &identity, experiment.table_point(Family::Phil))?;
    let oski = measure_point(harness, Family::Oski, &identity, experiment.table_point(Family::Oski))?;

    Ok(SpeedupRow {
        matrix: matrix.to_string(),
        reference_time: reference.mean_time,
        oski_time: oski.time.mean_time,
        phil_time: phil.time.mean_time,
        phil_oski_speedup: oski.time.mean_time / phil.time.mean_time,
        phil_reference_speedup: reference.mean_time / phil.time.mean_time,
        phil_median_error: metrics::median(phil.errors.view()),
        oski_median_error: metrics::median(oski.errors.view()),
        phil_mean_error: metrics::mean(phil.errors.view()),
        oski_mean_error: metrics::mean(oski.errors.view()),
    })
}

/// Speedups for every matrix, skipping the ones that fail.
pub fn speedup_sweep<R: Runner>(harness: &Harness<'_, R>, matrices: &[String]) -> SweepReport<SpeedupRow> {
    let mut report = SweepReport::default();
    for matrix in matrices {
        match speedup(harness, matrix) {
            Ok(row) => report.results.push(row),
            Err(e) => report.fail(matrix, None, None, e),
        }
    }
    report
}

/// Reference fill for every matrix, returned in input order.
pub fn warm_references<R: Runner>(harness: &Harness<'_, R>, matrices: &[String]) -> SweepReport<Array2<f64>> {
    let b = harness.experiment().b;
    let mut report = SweepReport::default();
    for matrix in matrices {
        match harness.reference(matrix, b) {
            Ok(reference) => report.results.push(reference),
            Err(e) => report.fail(matrix, None, None, e),
        }
    }
    report
}
