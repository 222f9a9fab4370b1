use crate::error::{BenchError, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// What the registry file says about one matrix.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MatrixEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Absolute location, bypassing the matrix directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// A resolved matrix. Its `key` names every cached artifact derived from it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MatrixIdentity {
    pub key: String,
    pub name: String,
    pub domain: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Maps logical matrix names to files under the matrix directory.
#[derive(Debug, Clone, Default)]
pub struct MatrixRegistry {
    matrix_dir: PathBuf,
    entries: FxHashMap<String, MatrixEntry>,
}

impl MatrixRegistry {
    pub fn new<P: AsRef<Path>>(matrix_dir: P, entries: FxHashMap<String, MatrixEntry>) -> Self {
        MatrixRegistry {
            matrix_dir: matrix_dir.as_ref().to_path_buf(),
            entries,
        }
    }

    /// Loads the registry JSON. A missing file is an empty registry.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(matrix_dir: P, registry_path: Q) -> Result<Self> {
        let registry_path = registry_path.as_ref();
        let entries = if registry_path.exists() {
            let content = fs::read_to_string(registry_path)?;
            serde_json::from_str(&content)?
        } else {
            log::warn!("matrix registry {} not found, using default names", registry_path.display());
            FxHashMap::default()
        };
        Ok(Self::new(matrix_dir, entries))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Resolves `key` to an existing file. Unregistered names fall back to `<key>.mtx`.
    pub fn resolve(&self, key: &str) -> Result<MatrixIdentity> {
        let entry = match self.entries.get(key) {
            Some(entry) => entry.clone(),
            None => {
                log::warn!("matrix {} not found in matrix registry", key);
                MatrixEntry::default()
            }
        };

        let relpath = entry.relpath.unwrap_or_else(|| format!("{}.mtx", key));
        let path = entry.path.unwrap_or_else(|| self.matrix_dir.join(&relpath));
        let metadata = fs::metadata(&path).map_err(|_| {
            BenchError::Precondition(format!("matrix {} not found at {}", key, path.display()))
        })?;
        if !metadata.is_file() {
            return Err(BenchError::Precondition(format!(
                "matrix {} at {} is not a file",
                key,
                path.display()
            )));
        }

        Ok(MatrixIdentity {
            key: key.to_string(),
            name: entry.name.unwrap_or_else(|| relpath.clone()),
            domain: entry.domain.unwrap_or_else(|| "unknown".to_string()),
            path,
            size: metadata.len(),
        })
    }

    /// Registers `entry` under `key` only for the duration of `f`.
    /// The entry is removed again whether or not `f` succeeds.
    pub fn scoped<T>(
        &mut self,
        key: &str,
        entry: MatrixEntry,
        f: impl FnOnce(&MatrixRegistry) -> Result<T>,
    ) -> Result<T> {
        let previous = self.entries.insert(key.to_string(), entry);
        let out = f(self);
        match previous {
            Some(previous) => {
                self.entries.insert(key.to_string(), previous);
            }
            None => {
                self.entries.remove(key);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(dir: &Path) -> MatrixRegistry {
        let mut entries = FxHashMap::default();
        entries.insert(
            "3dtube_conv".to_string(),
            MatrixEntry {
                relpath: Some("3dtube/3dtube.mtx".to_string()),
                domain: Some("fluid dynamics".to_string()),
                ..MatrixEntry::default()
            },
        );
        MatrixRegistry::new(dir, entries)
    }

    #[test]
    fn resolves_registered_matrix() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("3dtube")).unwrap();
        fs::write(dir.path().join("3dtube/3dtube.mtx"), "0123456789").unwrap();

        let identity = registry_with(dir.path()).resolve("3dtube_conv").unwrap();
        assert_eq!(identity.domain, "fluid dynamics");
        assert_eq!(identity.name, "3dtube/3dtube.mtx");
        assert_eq!(identity.size, 10);
    }

    #[test]
    fn unregistered_matrix_falls_back_to_default_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ct20stif.mtx"), "x").unwrap();

        let identity = registry_with(dir.path()).resolve("ct20stif").unwrap();
        assert_eq!(identity.domain, "unknown");
        assert_eq!(identity.path, dir.path().join("ct20stif.mtx"));
    }

    #[test]
    fn missing_file_is_a_precondition_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            registry_with(dir.path()).resolve("3dtube_conv"),
            Err(BenchError::Precondition(_))
        ));
    }

    #[test]
    fn scoped_entry_never_outlives_the_call() {
        let dir = tempfile::tempdir().unwrap();
        let dense = dir.path().join("dense.mtx");
        fs::write(&dense, "x").unwrap();
        let mut registry = registry_with(dir.path());

        let entry = MatrixEntry {
            path: Some(dense.clone()),
            domain: Some("synthetic".to_string()),
            ..MatrixEntry::default()
        };
        let seen = registry
            .scoped("__dense__", entry.clone(), |r| r.resolve("__dense__"))
            .unwrap();
        assert_eq!(seen.domain, "synthetic");
        assert!(!registry.contains("__dense__"));

        let failed: Result<()> = registry.scoped("__dense__", entry, |_| {
            Err(BenchError::Precondition("boom".to_string()))
        });
        assert!(failed.is_err());
        assert!(!registry.contains("__dense__"));
    }
}
