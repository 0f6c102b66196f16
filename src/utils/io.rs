//! IO utilities for payload files and scratch storage

use std::{
    fs::{self, File},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

use tracing::{debug, instrument, warn};

use crate::error::Result;

/// Reads the entire contents of a file into a byte vector.
#[instrument]
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Writes `data` next to `path` and renames it into place, so a failed write never
/// leaves a truncated output behind.
#[instrument(skip(data))]
pub fn write_file_atomic(path: &Path, data: &[u8]) -> Result<()> {
    ensure_parent_dir(path)?;
    let staging = path.with_extension("partial");
    {
        let mut file = File::create(&staging)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(e.into());
    }
    Ok(())
}

/// Overwrites a file with zeros, then removes it. Missing files are ignored.
#[instrument]
pub fn secure_erase(path: &Path) -> Result<u64> {
    if !path.exists() {
        warn!("File not found for secure erase: {}", path.display());
        return Ok(0);
    }

    let len = fs::metadata(path)?.len();
    let mut file = fs::OpenOptions::new().write(true).open(path)?;

    let zeros = vec![0u8; 8192];
    let mut remaining = len;

    file.seek(SeekFrom::Start(0))?;
    while remaining > 0 {
        let write_len = remaining.min(zeros.len() as u64) as usize;
        file.write_all(&zeros[..write_len])?;
        remaining -= write_len as u64;
    }

    file.sync_all()?;
    drop(file);
    fs::remove_file(path)?;

    debug!("Securely erased {} bytes at {}", len, path.display());
    Ok(len)
}

/// Ensures parent directory exists for a file path.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
