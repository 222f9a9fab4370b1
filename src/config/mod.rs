use crate::error::{BenchError, Result};
use crate::invocation::{Family, ParameterPoint};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Geometric search settings used to build ROI curves for one estimator family.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RoiConfig {
    pub family: Family,
    pub parameter: SearchParameter,
    pub init: f64,
    pub rate: f64,
    pub low_error: f64,
    pub high_error: f64,
    pub max_steps: usize,
    pub max_reversals: usize,
}

impl Default for RoiConfig {
    fn default() -> Self {
        RoiConfig {
            family: Family::Phil,
            parameter: SearchParameter::Epsilon,
            init: 0.5,
            rate: 2.0_f64.sqrt(),
            low_error: 0.05,
            high_error: 0.5,
            max_steps: 16,
            max_reversals: 2,
        }
    }
}

/// One fixed point per estimator family for table generation.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct TablePoints {
    pub phil: ParameterPoint,
    pub oski: ParameterPoint,
}

/// The scalar an ROI search scales.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchParameter {
    Epsilon,
    Delta,
}

/// Length of the default plot grid.
pub const DEFAULT_PLOT_STEPS: usize = 10;

/// Immutable description of one experiment. Loaded once and passed by reference.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Experiment {
    pub experiment_name: String,
    pub data_path: PathBuf,
    pub matrix_path: PathBuf,
    pub matrix_registry_path: PathBuf,
    pub bin_path: PathBuf,
    pub fill_prefix: String,
    pub fill_vars: FxHashMap<String, String>,
    pub spmv_prefix: String,
    pub spmv_vars: FxHashMap<String, String>,
    #[serde(rename = "B")]
    pub b: usize,
    pub epsilon: f64,
    pub delta: f64,
    pub sigma: f64,
    pub trials: u64,
    pub profile_m: usize,
    pub profile_n: usize,
    pub profile_trials: u64,
    pub min_wall_time: f64,
    pub max_adaptive_trials: u64,
    pub fill_floor: f64,
    pub lock_timeout_secs: u64,
    pub pin_core: Option<usize>,
    pub table_matrices: Vec<String>,
    pub table_points: TablePoints,
    pub plot_points: FxHashMap<String, Vec<ParameterPoint>>,
    pub roi: Vec<RoiConfig>,
}

impl Default for Experiment {
    fn default() -> Self {
        Experiment {
            experiment_name: "DefaultExperiment".to_string(),
            data_path: PathBuf::from("data"),
            matrix_path: PathBuf::from("data/matrix"),
            matrix_registry_path: PathBuf::from("data/matrix/registry.json"),
            bin_path: PathBuf::from("bin"),
            fill_prefix: String::new(),
            fill_vars: FxHashMap::default(),
            spmv_prefix: String::new(),
            spmv_vars: FxHashMap::default(),
            b: 12,
            epsilon: 0.5,
            delta: 0.01,
            sigma: 0.02,
            trials: 100,
            profile_m: 1000,
            profile_n: 1000,
            profile_trials: 100,
            min_wall_time: 0.1,
            max_adaptive_trials: 10_000_000,
            fill_floor: 1e-12,
            lock_timeout_secs: 3600,
            pin_core: None,
            table_matrices: Vec::new(),
            table_points: TablePoints::default(),
            plot_points: FxHashMap::default(),
            roi: vec![
                RoiConfig::default(),
                RoiConfig {
                    family: Family::Oski,
                    parameter: SearchParameter::Delta,
                    init: 0.005,
                    ..RoiConfig::default()
                },
            ],
        }
    }
}

impl Experiment {
    /// Loads an experiment descriptor from a JSON file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(expand_path(path.as_ref()))?;
        let experiment: Experiment = serde_json::from_str(&content)?;
        experiment.validate()?;
        Ok(experiment.expanded())
    }

    fn validate(&self) -> Result<()> {
        if self.b == 0 {
            return Err(BenchError::Config("B must be at least 1".to_string()));
        }
        if self.trials == 0 || self.profile_trials == 0 {
            return Err(BenchError::Config("trial counts must be at least 1".to_string()));
        }
        if self.profile_m == 0 || self.profile_n == 0 {
            return Err(BenchError::Config("profile matrix dimensions must be positive".to_string()));
        }
        if !(self.min_wall_time > 0.0) {
            return Err(BenchError::Config("min_wall_time must be positive".to_string()));
        }
        if !(self.fill_floor > 0.0) {
            return Err(BenchError::Config("fill_floor must be positive".to_string()));
        }
        for roi in &self.roi {
            if !(roi.rate > 1.0) || !(roi.init > 0.0) {
                return Err(BenchError::Config(format!(
                    "roi search for {} needs rate > 1 and init > 0",
                    roi.family
                )));
            }
            if !(roi.low_error < roi.high_error) {
                return Err(BenchError::Config(format!(
                    "roi search for {} needs low_error < high_error",
                    roi.family
                )));
            }
        }
        Ok(())
    }

    fn expanded(mut self) -> Self {
        self.data_path = expand_path(&self.data_path);
        self.matrix_path = expand_path(&self.matrix_path);
        self.matrix_registry_path = expand_path(&self.matrix_registry_path);
        self.bin_path = expand_path(&self.bin_path);
        self
    }

    /// Root of every artifact this experiment produces.
    pub fn experiment_dir(&self) -> PathBuf {
        self.data_path.join("experiment").join(&self.experiment_name)
    }

    pub fn references_dir(&self) -> PathBuf {
        self.experiment_dir().join("references")
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.experiment_dir().join("profile")
    }

    pub fn spmv_records_dir(&self) -> PathBuf {
        self.experiment_dir().join("spmv_records")
    }

    pub fn table_dir(&self) -> PathBuf {
        self.experiment_dir().join("table")
    }

    pub fn plots_dir(&self) -> PathBuf {
        self.experiment_dir().join("plots")
    }

    pub fn roi_dir(&self) -> PathBuf {
        self.experiment_dir().join("roi")
    }

    /// Configured plot points for `matrix`, or a geometric grid from loose to
    /// tight tolerances when none are configured.
    pub fn plot_points_for(&self, matrix: &str) -> Vec<ParameterPoint> {
        if let Some(points) = self.plot_points.get(matrix) {
            return points.clone();
        }
        exprange(7.0, 0.2, DEFAULT_PLOT_STEPS)
            .into_iter()
            .zip(exprange(0.001, 0.06, DEFAULT_PLOT_STEPS))
            .map(|(epsilon, delta)| ParameterPoint {
                epsilon: Some(epsilon),
                delta: Some(delta),
                ..ParameterPoint::default()
            })
            .collect()
    }

    /// The point at which `family` is evaluated for table rows.
    pub fn table_point(&self, family: Family) -> &ParameterPoint {
        match family {
            Family::Phil => &self.table_points.phil,
            Family::Oski => &self.table_points.oski,
        }
    }
}

/// Expands `$VAR` and `${VAR}` references. Unknown variables are left as written.
pub fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(expand_vars(&path.to_string_lossy()))
}

fn expand_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        if ch != '$' {
            out.push(ch);
            continue;
        }
        let braced = matches!(chars.peek(), Some((_, '{')));
        if braced {
            chars.next();
        }
        let start = if braced { i + 2 } else { i + 1 };
        let mut end = start;
        while let Some(&(j, c)) = chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                end = j + c.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let name = &input[start..end];
        let closed = if braced {
            let close = matches!(chars.peek(), Some((_, '}')));
            if close {
                chars.next();
            }
            close
        } else {
            true
        };
        match std::env::var(name) {
            Ok(value) if !name.is_empty() && closed => out.push_str(&value),
            _ => {
                out.push('$');
                if braced {
                    out.push('{');
                }
                out.push_str(name);
                if braced && closed {
                    out.push('}');
                }
            }
        }
    }

    out
}

/// `n` values spaced geometrically from `a` to `b` inclusive.
pub fn exprange(a: f64, b: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![a],
        _ => {
            let r = (b / a).powf(1.0 / (n - 1) as f64);
            (0..n).map(|i| a * r.powi(i as i32)).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn empty_descriptor_takes_defaults() {
        let experiment: Experiment = serde_json::from_str("{}").unwrap();
        assert_eq!(experiment.b, 12);
        assert_eq!(experiment.epsilon, 0.5);
        assert_eq!(experiment.delta, 0.01);
        assert_eq!(experiment.sigma, 0.02);
        assert_eq!(experiment.trials, 100);
        assert_eq!(experiment.profile_m, 1000);
        assert_eq!(experiment.profile_n, 1000);
        assert_eq!(experiment.min_wall_time, 0.1);
    }

    #[test]
    fn descriptor_overrides_and_paths() {
        let json = r#"{
            "experiment_name": "Lanka12",
            "data_path": "/tmp/data",
            "B": 4,
            "spmv_prefix": "numactl -N 1",
            "spmv_vars": {"OMP_NUM_THREADS": "12"}
        }"#;
        let experiment: Experiment = serde_json::from_str(json).unwrap();
        assert_eq!(experiment.b, 4);
        assert_eq!(experiment.spmv_vars["OMP_NUM_THREADS"], "12");
        assert_eq!(
            experiment.references_dir(),
            PathBuf::from("/tmp/data/experiment/Lanka12/references")
        );
    }

    #[test]
    fn load_rejects_zero_block_bound() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.json");
        fs::write(&path, r#"{"B": 0}"#).unwrap();
        assert!(matches!(Experiment::load(&path), Err(BenchError::Config(_))));
    }

    #[test]
    fn expands_environment_variables() {
        std::env::set_var("FILL_BENCH_TEST_ROOT", "/scratch");
        assert_eq!(
            expand_path(Path::new("${FILL_BENCH_TEST_ROOT}/data")),
            PathBuf::from("/scratch/data")
        );
        assert_eq!(
            expand_path(Path::new("$FILL_BENCH_TEST_ROOT/m")),
            PathBuf::from("/scratch/m")
        );
        assert_eq!(
            expand_path(Path::new("$FILL_BENCH_SURELY_UNSET/m")),
            PathBuf::from("$FILL_BENCH_SURELY_UNSET/m")
        );
    }

    #[test]
    fn plot_points_fall_back_to_grid() {
        let mut experiment = Experiment::default();
        let grid = experiment.plot_points_for("3dtube_conv");
        assert_eq!(grid.len(), DEFAULT_PLOT_STEPS);
        assert_relative_eq!(grid[0].epsilon.unwrap(), 7.0);
        assert_relative_eq!(grid[9].delta.unwrap(), 0.06, epsilon = 1e-12);

        let explicit = vec![ParameterPoint {
            epsilon: Some(0.3),
            ..ParameterPoint::default()
        }];
        experiment
            .plot_points
            .insert("3dtube_conv".to_string(), explicit.clone());
        assert_eq!(experiment.plot_points_for("3dtube_conv"), explicit);
    }

    #[test]
    fn exprange_hits_both_ends() {
        let values = exprange(7.0, 0.2, 10);
        assert_eq!(values.len(), 10);
        assert_relative_eq!(values[0], 7.0);
        assert_relative_eq!(values[9], 0.2, epsilon = 1e-12);
        assert!(values.windows(2).all(|w| w[1] < w[0]));
    }
}
