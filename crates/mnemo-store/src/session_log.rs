//! Durable session transcripts (`memory/sessions/<session-id>.jsonl`).
//!
//! One JSON line per message, appended as the session runs. The transcript
//! is replayable input for the Observer after a crash: the rolling buffer
//! lives in memory, this file does not.

use std::path::{Path, PathBuf};

use mnemo_core::errors::MemoryError;
use mnemo_core::messages::SessionMessage;

use crate::fs::{append_line, ensure_private_dir};

#[derive(Debug)]
pub struct SessionLog {
    dir: PathBuf,
}

impl SessionLog {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.jsonl"))
    }

    pub fn append(&self, session_id: &str, message: &SessionMessage) -> Result<(), MemoryError> {
        ensure_private_dir(&self.dir)?;
        let line = serde_json::to_string(message).map_err(|e| {
            MemoryError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        append_line(&self.path_for(session_id), &line)
    }

    /// Read a transcript back; unparseable lines are skipped.
    pub fn read(&self, session_id: &str) -> Result<Vec<SessionMessage>, MemoryError> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(raw
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.path_for(session_id).exists()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
