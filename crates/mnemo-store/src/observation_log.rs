//! The human-readable observation log and its paired audit chain.
//!
//! Reads verify the file hash against the audit tail before any entry is
//! served; mutations rebuild the file content and swap it atomically, then
//! extend the chain. Both run under the directory's advisory lock, so writes
//! across processes sharing one memory directory are serialized.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use mnemo_core::audit::AuditRecord;
use mnemo_core::config::MemoryConfig;
use mnemo_core::errors::MemoryError;
use mnemo_core::hash::sha256_hex;
use mnemo_core::observation::{parse_log, serialize_log, Observation};
use mnemo_core::provenance::{ProvenanceTag, WriteSource};
use mnemo_core::tokens::Tokenizer;

use crate::audit_log::AuditLog;
use crate::fs::{atomic_write, ensure_private_dir, ensure_private_file, FileLock};

use std::path::PathBuf;

/// Verified snapshot of the log.
#[derive(Clone, Debug, Default)]
pub struct LoadedLog {
    /// Newest first by `observed_on`; file order breaks ties.
    pub observations: Vec<Observation>,
    /// Entries skipped by the tolerant parser.
    pub malformed: usize,
}

/// Owns `observations.md` + `audit.jsonl` as a consistent pair.
#[derive(Debug)]
pub struct ObservationStore {
    obs_path: PathBuf,
    lock_path: PathBuf,
    audit: AuditLog,
}

impl ObservationStore {
    /// Open (and initialize if fresh) the store under `config.storage_path`.
    ///
    /// A fresh store gets an empty observation file and a single `init`
    /// audit record rooting the chain at the empty-file hash.
    pub fn open(config: &MemoryConfig, now: DateTime<Utc>) -> Result<Self, MemoryError> {
        ensure_private_dir(&config.storage_path)?;
        let store = Self {
            obs_path: config.observations_path(),
            lock_path: config.lock_path(),
            audit: AuditLog::new(config.audit_path()),
        };

        let _guard = FileLock::exclusive(&store.lock_path)?;
        ensure_private_file(&store.obs_path)?;
        if store.audit.last()?.is_none() {
            let content = store.read_raw()?;
            let hash = sha256_hex(content.as_bytes());
            store.audit.append(&AuditRecord {
                ts: now,
                source: WriteSource::Init,
                char_delta: 0,
                log_sha256: hash.clone(),
                prev_sha256: hash,
                provenance: None,
            })?;
            debug!(path = %store.obs_path.display(), "observation store initialized");
        }
        Ok(store)
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Verified consistent snapshot: raw bytes and hash check run under the
    /// shared lock, parsing happens after release.
    pub fn load(&self) -> Result<LoadedLog, MemoryError> {
        let raw = {
            let _guard = FileLock::shared(&self.lock_path)?;
            let raw = self.read_raw()?;
            self.audit.verify_content(&raw)?;
            raw
        };
        let parsed = parse_log(&raw);
        if parsed.malformed > 0 {
            warn!(count = parsed.malformed, "skipped malformed observation entries");
        }
        let mut observations = parsed.observations;
        observations.sort_by(|a, b| b.observed_on.cmp(&a.observed_on));
        Ok(LoadedLog {
            observations,
            malformed: parsed.malformed,
        })
    }

    /// Append one entry under the audit chain.
    pub fn append(&self, obs: &Observation, tag: ProvenanceTag) -> Result<(), MemoryError> {
        let _guard = FileLock::exclusive(&self.lock_path)?;
        let old = self.read_raw()?;
        self.audit.verify_content(&old)?;

        let mut new = old.clone();
        if !new.trim().is_empty() {
            if !new.ends_with('\n') {
                new.push('\n');
            }
            new.push('\n');
        } else {
            new.clear();
        }
        new.push_str(&obs.serialize());
        new.push('\n');

        self.commit(&old, new, tag)
    }

    /// Replace the whole log. Reflector-only; the single destructive write
    /// in the system.
    pub fn rewrite(
        &self,
        observations: &[Observation],
        tag: ProvenanceTag,
    ) -> Result<(), MemoryError> {
        let _guard = FileLock::exclusive(&self.lock_path)?;
        let old = self.read_raw()?;
        self.audit.verify_content(&old)?;
        self.commit(&old, serialize_log(observations), tag)
    }

    /// Approximate token size of the raw log.
    pub fn size_tokens(&self, tokenizer: &dyn Tokenizer) -> Result<u32, MemoryError> {
        Ok(tokenizer.count(&self.read_raw()?))
    }

    /// Raw file contents, unverified. Reflector input and test assertions.
    pub fn read_raw(&self) -> Result<String, MemoryError> {
        if !self.obs_path.exists() {
            return Ok(String::new());
        }
        Ok(std::fs::read_to_string(&self.obs_path)?)
    }

    fn commit(&self, old: &str, new: String, tag: ProvenanceTag) -> Result<(), MemoryError> {
        atomic_write(&self.obs_path, &new)?;
        let prev_sha256 = self
            .audit
            .last()?
            .map(|r| r.log_sha256)
            .unwrap_or_else(mnemo_core::hash::empty_hash);
        let record = AuditRecord {
            ts: tag.ts,
            source: tag.source,
            char_delta: new.chars().count() as i64 - old.chars().count() as i64,
            log_sha256: sha256_hex(new.as_bytes()),
            prev_sha256,
            provenance: Some(tag),
        };
        self.audit.append(&record)?;
        debug!(source = %record.source, chars = new.len(), "observation log committed");
        Ok(())
    }
}
