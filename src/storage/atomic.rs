//! Crash-safe file replacement.
//!
//! Data goes to a temporary file in the target's directory, is synced, and
//! is renamed over the target; the parent directory is then synced on Unix.
//! After a crash the target holds either the old content or the new content.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Prefix of in-flight temporary files; directory scans skip them.
pub(crate) const TEMP_PREFIX: &str = ".tmp.";

fn temp_path(path: &Path, parent: &Path) -> PathBuf {
    let file_name = path.file_name().and_then(|s| s.to_str()).unwrap_or("file");
    parent.join(format!("{TEMP_PREFIX}{file_name}.{}", Uuid::new_v4()))
}

#[cfg(unix)]
fn fsync_dir(path: &Path) -> io::Result<()> {
    File::open(path)?.sync_all()
}

#[cfg(not(unix))]
fn fsync_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Atomically replaces `path` with `data`, creating parent directories.
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("{} has no parent directory", path.display()))
    })?;
    fs::create_dir_all(parent)?;

    let temp = temp_path(path, parent);
    let written = (|| {
        let mut file = File::create(&temp)?;
        file.write_all(data)?;
        file.sync_all()
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }

    if let Err(e) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }
    fsync_dir(parent)
}

/// Removes `path`, treating a missing file as success.
pub(crate) fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
