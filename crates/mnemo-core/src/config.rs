use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for a context manager instance and the stores beneath it.
/// Paths are derived from `storage_path` the same way for every process
/// sharing a memory directory.
#[derive(Clone, Debug)]
pub struct MemoryConfig {
    /// Root of the memory directory (created 0700).
    pub storage_path: PathBuf,
    /// Directory holding per-run checkpoint files.
    pub runs_path: PathBuf,
    /// Approximate buffered session tokens before the Observer fires.
    pub observer_threshold: u32,
    /// Approximate observation-log tokens before the Reflector fires.
    pub reflector_threshold: u32,
    /// Per-entry char budget after sanitization.
    pub max_entry_chars: usize,
    /// Jaccard overlap below which an instruction counts as drifted.
    pub anchor_drift_threshold: f64,
    /// Per-call deadline for LLM requests.
    pub llm_deadline: Duration,
}

impl MemoryConfig {
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        let storage_path = storage_path.into();
        let runs_path = storage_path
            .parent()
            .unwrap_or(Path::new("."))
            .join("runs");
        Self {
            storage_path,
            runs_path,
            observer_threshold: 30_000,
            reflector_threshold: 40_000,
            max_entry_chars: 2048,
            anchor_drift_threshold: 0.2,
            llm_deadline: Duration::from_secs(60),
        }
    }

    pub fn observations_path(&self) -> PathBuf {
        self.storage_path.join("observations.md")
    }

    pub fn audit_path(&self) -> PathBuf {
        self.storage_path.join("audit.jsonl")
    }

    pub fn sessions_path(&self) -> PathBuf {
        self.storage_path.join("sessions")
    }

    /// Sentinel file the advisory lock is held on. A separate file because
    /// atomic rename replaces the observation file's inode.
    pub fn lock_path(&self) -> PathBuf {
        self.storage_path.join(".observations.lock")
    }
}
