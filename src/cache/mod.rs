use crate::error::{BenchError, Result};
use ndarray::Array2;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// Identifies one persisted matrix artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactKey {
    /// Exact fill of a matrix up to block bound `b`.
    Reference { matrix: String, b: usize },
    /// Relative SpMV throughput of an `m × n` dense matrix, per block size.
    Profile { b: usize, m: usize, n: usize, trials: u64 },
    /// Absolute SpMV time of a matrix, per block size.
    Record { matrix: String, b: usize, trials: u64 },
}

impl ArtifactKey {
    /// Location relative to the experiment directory.
    pub fn relative_path(&self) -> PathBuf {
        match self {
            ArtifactKey::Reference { matrix, b } => {
                Path::new("references").join(format!("{}_reference_{}.bin", matrix, b))
            }
            ArtifactKey::Profile { b, m, n, trials } => {
                Path::new("profile").join(format!("profile_{}_{}_{}_{}.bin", b, m, n, trials))
            }
            ArtifactKey::Record { matrix, b, trials } => {
                Path::new("spmv_records").join(format!("{}_{}_{}.bin", matrix, b, trials))
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ArtifactKey::Reference { .. } => "reference",
            ArtifactKey::Profile { .. } => "profile",
            ArtifactKey::Record { .. } => "spmv record",
        }
    }
}

/// Write-once store of matrix artifacts under an experiment directory.
///
/// Each key is computed at most once: a lock file serializes writers of the
/// same key across processes, and artifacts only appear through an atomic
/// rename, so readers never observe a partial file.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    lock_timeout: Duration,
    poll_interval: Duration,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(root: P, lock_timeout: Duration) -> Self {
        ArtifactStore {
            root: root.as_ref().to_path_buf(),
            lock_timeout,
            poll_interval: Duration::from_millis(200),
        }
    }

    pub fn path(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    pub fn contains(&self, key: &ArtifactKey) -> bool {
        self.path(key).is_file()
    }

    pub fn load(&self, key: &ArtifactKey) -> Result<Array2<f64>> {
        read_matrix(&self.path(key))
    }

    /// Returns the stored artifact for `key`, running `compute` only if none exists.
    /// A failed computation stores nothing.
    pub fn get_or_compute<F>(&self, key: &ArtifactKey, compute: F) -> Result<Array2<f64>>
    where
        F: FnOnce() -> Result<Array2<f64>>,
    {
        let path = self.path(key);
        if path.is_file() {
            log::info!("{} cache hit: {}", key.kind(), path.display());
            return read_matrix(&path);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let _lock = match self.acquire(&path)? {
            Some(lock) => lock,
            None => {
                log::info!("{} computed by another process: {}", key.kind(), path.display());
                return read_matrix(&path);
            }
        };
        if path.is_file() {
            return read_matrix(&path);
        }

        log::info!("{} cache miss, computing {}", key.kind(), path.display());
        let artifact = compute()?;
        write_matrix(&path, &artifact)?;
        Ok(artifact)
    }

    /// Takes the per-key lock, or returns `None` once the artifact shows up
    /// while another holder is computing it.
    fn acquire(&self, path: &Path) -> Result<Option<LockFile>> {
        let lock_path = lock_path(path);
        let start = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
                Ok(file) => {
                    let lock = LockFile { path: lock_path };
                    return record_holder(lock, file).map(Some);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if path.is_file() {
                        return Ok(None);
                    }
                    if reclaim_stale(&lock_path)? {
                        continue;
                    }
                    if start.elapsed() >= self.lock_timeout {
                        return Err(BenchError::LockTimeout(lock_path));
                    }
                    thread::sleep(self.poll_interval);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[derive(Debug)]
struct LockFile {
    path: PathBuf,
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("could not remove lock {}: {}", self.path.display(), e);
        }
    }
}

/// Writes this process id into a freshly created lock. On failure the
/// guard drops and the lock is removed.
fn record_holder<W: Write>(lock: LockFile, mut file: W) -> Result<LockFile> {
    writeln!(file, "{}", std::process::id())?;
    file.flush()?;
    Ok(lock)
}

/// Removes `lock_path` if the process recorded in it no longer exists.
/// A lock whose holder cannot be read is treated as live.
fn reclaim_stale(lock_path: &Path) -> Result<bool> {
    let holder = match read_holder(lock_path) {
        Some(pid) => pid,
        None => return Ok(false),
    };
    if !process_gone(holder) {
        return Ok(false);
    }
    // Another waiter may have reclaimed and relocked in the meantime.
    if read_holder(lock_path) != Some(holder) {
        return Ok(false);
    }
    log::warn!(
        "removing stale lock {} left by process {}",
        lock_path.display(),
        holder
    );
    match fs::remove_file(lock_path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e.into()),
    }
}

fn read_holder(lock_path: &Path) -> Option<u32> {
    fs::read_to_string(lock_path).ok()?.trim().parse().ok()
}

#[cfg(target_os = "linux")]
fn process_gone(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 only checks that the process exists.
    let status = unsafe { libc::kill(pid, 0) };
    status == -1 && std::io::Error::last_os_error().raw_os_error() == Some(libc::ESRCH)
}

#[cfg(not(target_os = "linux"))]
fn process_gone(_pid: u32) -> bool {
    false
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

/// Scratch name for `path` owned by this process, `<name>.<pid>.partial`.
pub(crate) fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.partial", std::process::id()));
    path.with_file_name(name)
}

/// Reads a matrix written by [`write_matrix`].
pub fn read_matrix(path: &Path) -> Result<Array2<f64>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(bincode::deserialize_from(reader)?)
}

/// Writes `matrix` next to `path` and renames it into place.
pub fn write_matrix(path: &Path, matrix: &Array2<f64>) -> Result<()> {
    let tmp = partial_path(path);
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        bincode::serialize_into(&mut writer, matrix)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
