//! Append-only tamper-evident audit chain (`audit.jsonl`).

use std::path::PathBuf;

use tracing::debug;

use mnemo_core::audit::AuditRecord;
use mnemo_core::errors::MemoryError;
use mnemo_core::hash::{empty_hash, sha256_hex};

use crate::fs::append_line;

/// One JSON record per line; records bind to each other through
/// `prev_sha256` and to the observation file through `log_sha256`.
/// There is no deletion or rewrite API.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Read and validate the whole chain. Fails with `AuditChainBroken` on
    /// unparseable lines or a broken `prev_sha256` link.
    pub fn records(&self) -> Result<Vec<AuditRecord>, MemoryError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let mut records = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: AuditRecord = serde_json::from_str(line).map_err(|e| {
                MemoryError::AuditChainBroken {
                    reason: format!("unparseable record at line {}: {e}", idx + 1),
                }
            })?;
            records.push(record);
        }
        Self::verify_links(&records)?;
        Ok(records)
    }

    pub fn last(&self) -> Result<Option<AuditRecord>, MemoryError> {
        Ok(self.records()?.pop())
    }

    /// Append one record, enforcing the chain link against the current tail.
    pub fn append(&self, record: &AuditRecord) -> Result<(), MemoryError> {
        let expected_prev = self
            .last()?
            .map(|last| last.log_sha256)
            .unwrap_or_else(empty_hash);
        if record.prev_sha256 != expected_prev {
            return Err(MemoryError::AuditChainBroken {
                reason: format!(
                    "record prev_sha256 {} does not extend chain tail {expected_prev}",
                    record.prev_sha256
                ),
            });
        }
        let line = serde_json::to_string(record).map_err(|e| MemoryError::AuditChainBroken {
            reason: format!("record failed to serialize: {e}"),
        })?;
        append_line(&self.path, &line)?;
        debug!(source = %record.source, char_delta = record.char_delta, "audit record appended");
        Ok(())
    }

    /// Check that `content` (the current observation file) matches the last
    /// recorded hash. An empty chain verifies trivially.
    pub fn verify_content(&self, content: &str) -> Result<(), MemoryError> {
        let Some(last) = self.last()? else {
            return Ok(());
        };
        let actual = sha256_hex(content.as_bytes());
        if actual != last.log_sha256 {
            return Err(MemoryError::TamperDetected {
                expected: last.log_sha256,
                actual,
            });
        }
        Ok(())
    }

    /// Replay the chain: every link must hold and the first record must root
    /// at the empty-file hash. Returns the final hash the observation file
    /// must carry.
    pub fn replay(&self) -> Result<Option<String>, MemoryError> {
        let records = self.records()?;
        Ok(records.last().map(|r| r.log_sha256.clone()))
    }

    fn verify_links(records: &[AuditRecord]) -> Result<(), MemoryError> {
        if let Some(first) = records.first() {
            if first.prev_sha256 != empty_hash() {
                return Err(MemoryError::AuditChainBroken {
                    reason: "first record does not root at the empty-file hash".into(),
                });
            }
        }
        for (idx, pair) in records.windows(2).enumerate() {
            if !pair[0].links_to(&pair[1]) {
                return Err(MemoryError::AuditChainBroken {
                    reason: format!("link broken between records {} and {}", idx + 1, idx + 2),
                });
            }
        }
        Ok(())
    }
}
