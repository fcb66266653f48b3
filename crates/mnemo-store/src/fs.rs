//! Hardened filesystem primitives.
//!
//! Atomic replace (temp file + fsync + rename + parent fsync), private
//! create modes with an explicit chmod (process umask can mask the mode given
//! at create time), and advisory locking via flock on a sentinel file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use fs2::FileExt;
use tempfile::NamedTempFile;

use mnemo_core::errors::MemoryError;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Create `dir` (and parents) with mode 0700.
pub fn ensure_private_dir(dir: &Path) -> Result<(), MemoryError> {
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    Ok(())
}

/// Create `path` as an empty 0600 file if it does not exist.
pub fn ensure_private_file(path: &Path) -> Result<(), MemoryError> {
    if !path.exists() {
        File::create(path)?;
        set_private(path)?;
    }
    Ok(())
}

fn set_private(path: &Path) -> Result<(), MemoryError> {
    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Atomically replace `path` with `content`. Crash at any point leaves
/// either the old complete file or the new complete file on disk.
pub fn atomic_write(path: &Path, content: &str) -> Result<(), MemoryError> {
    let parent = path
        .parent()
        .ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent")
        })?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| MemoryError::Io(e.error))?;
    set_private(path)?;
    // Make the rename itself durable.
    if let Ok(dir) = File::open(parent) {
        let _ = dir.sync_all();
    }
    Ok(())
}

/// Append `line` (plus newline) to `path` and fsync. Used for the
/// append-only jsonl files; the line is small enough that the append is
/// effectively atomic on local filesystems.
pub fn append_line(path: &Path, line: &str) -> Result<(), MemoryError> {
    ensure_private_file(path)?;
    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    Ok(())
}

/// Advisory flock held for the guard's lifetime.
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Block until the exclusive lock on `sentinel` is acquired.
    pub fn exclusive(sentinel: &Path) -> Result<Self, MemoryError> {
        let file = Self::open_sentinel(sentinel)?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }

    /// Block until a shared lock on `sentinel` is acquired.
    pub fn shared(sentinel: &Path) -> Result<Self, MemoryError> {
        let file = Self::open_sentinel(sentinel)?;
        file.lock_shared()?;
        Ok(Self { file })
    }

    fn open_sentinel(sentinel: &Path) -> Result<File, MemoryError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(sentinel)?;
        set_private(sentinel)?;
        Ok(file)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}
