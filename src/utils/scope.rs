//! Per-invocation working storage
//!
//! A `WorkingScope` owns a private scratch directory for the lifetime of one
//! pipeline run. Every file spilled into it is overwritten and removed when the
//! scope is released or dropped, so cleanup happens on success, error and panic
//! paths alike.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::config::ScopeConfig;
use crate::error::{Error, Result};
use crate::utils::io::secure_erase;

#[derive(Debug)]
pub struct WorkingScope {
    dir: Option<TempDir>,
    spilled_bytes: AtomicU64,
}

impl WorkingScope {
    /// Creates a fresh scratch directory (mode 0700 on unix).
    pub fn acquire(config: &ScopeConfig) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pii-redact-");
        let dir = match &config.temp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| Error::ResourceError(format!("cannot create scratch directory: {}", e)))?;

        debug!("Acquired working scope at {}", dir.path().display());
        Ok(Self {
            dir: Some(dir),
            spilled_bytes: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// Writes `bytes` to a new file named `name` inside the scope.
    pub fn spill(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::ResourceError(format!("invalid scratch file name {:?}", name)));
        }
        let dir = self
            .path()
            .ok_or_else(|| Error::ResourceError("working scope already released".into()))?;
        let path = dir.join(name);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| Error::ResourceError(format!("cannot create {}: {}", name, e)))?;
        file.write_all(bytes)?;
        file.flush()?;

        self.spilled_bytes.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(path)
    }

    /// Total bytes written into the scope so far
    pub fn spilled_bytes(&self) -> u64 {
        self.spilled_bytes.load(Ordering::Relaxed)
    }

    /// Wipes and removes everything, reporting the first failure.
    pub fn release(mut self) -> Result<()> {
        match self.dir.take() {
            Some(dir) => Self::wipe(dir),
            None => Ok(()),
        }
    }

    fn wipe(dir: TempDir) -> Result<()> {
        let mut first_error = None;
        match fs::read_dir(dir.path()) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.is_file() {
                        if let Err(e) = secure_erase(&path) {
                            first_error.get_or_insert(e);
                        }
                    }
                }
            }
            Err(e) => {
                first_error.get_or_insert(e.into());
            }
        }
        let location = dir.path().display().to_string();
        if let Err(e) = dir.close() {
            first_error.get_or_insert(Error::ResourceError(format!(
                "cannot remove scratch directory {}: {}",
                location, e
            )));
        }
        debug!("Released working scope at {}", location);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for WorkingScope {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = Self::wipe(dir) {
                warn!("Working scope cleanup incomplete: {}", e);
            }
        }
    }
}
