//! Per-run pipeline checkpoints (`runs/<run_id>.json`).
//!
//! A run is an ordered sequence of named steps. Each mutation persists the
//! whole file atomically, so a crashed pipeline reopens its run and resumes
//! from `completed_steps()`. Completing an already-done step is a no-op that
//! preserves the first successful result; `reset` is the only rewind.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

use mnemo_core::errors::MemoryError;

use crate::fs::{atomic_write, ensure_private_dir};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Complete,
    Failed,
}

/// One checkpointed step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub done: bool,
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Steps keyed by name, serialized as a JSON object that keeps insertion
/// order (a sorted map would shuffle the pipeline's step sequence).
#[derive(Clone, Debug, Default, PartialEq)]
struct Steps(Vec<(String, StepRecord)>);

impl Steps {
    fn get(&self, name: &str) -> Option<&StepRecord> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut StepRecord> {
        self.0.iter_mut().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    fn upsert(&mut self, name: &str, record: StepRecord) {
        match self.get_mut(name) {
            Some(existing) => *existing = record,
            None => self.0.push((name.to_owned(), record)),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|(n, _)| n == name)
    }
}

impl Serialize for Steps {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, record) in &self.0 {
            map.serialize_entry(name, record)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Steps {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StepsVisitor;

        impl<'de> Visitor<'de> for StepsVisitor {
            type Value = Steps;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of step name to step record")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Steps, A::Error> {
                let mut steps = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, record)) = access.next_entry::<String, StepRecord>()? {
                    steps.push((name, record));
                }
                Ok(Steps(steps))
            }
        }

        deserializer.deserialize_map(StepsVisitor)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct RunFile {
    run_id: String,
    status: RunStatus,
    steps: Steps,
}

/// Resumable checkpoint state for one pipeline run. Owned by a single
/// orchestrator; concurrent writers to the same `run_id` are undefined.
#[derive(Debug)]
pub struct RunState {
    path: PathBuf,
    file: RunFile,
}

impl RunState {
    /// Open the run, loading prior checkpoints when the file exists.
    pub fn open(runs_dir: &Path, run_id: &str) -> Result<Self, MemoryError> {
        ensure_private_dir(runs_dir)?;
        let path = runs_dir.join(format!("{run_id}.json"));
        let file = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).map_err(|e| {
                MemoryError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("run file {run_id}.json is corrupt: {e}"),
                ))
            })?
        } else {
            RunFile {
                run_id: run_id.to_owned(),
                status: RunStatus::InProgress,
                steps: Steps::default(),
            }
        };
        Ok(Self { path, file })
    }

    pub fn run_id(&self) -> &str {
        &self.file.run_id
    }

    pub fn status(&self) -> RunStatus {
        self.file.status
    }

    /// Mark `step` done. A no-op when the step is already done, so the
    /// first successful result is preserved.
    pub fn complete(&mut self, step: &str, result: Value) -> Result<(), MemoryError> {
        if self.is_complete(step) {
            debug!(step, run_id = %self.file.run_id, "step already complete, ignoring");
            return Ok(());
        }
        self.file.steps.upsert(
            step,
            StepRecord {
                done: true,
                result,
                completed_at: Some(Utc::now()),
            },
        );
        self.save()
    }

    /// Record a step failure without marking it done.
    pub fn fail(&mut self, step: &str, error: Value) -> Result<(), MemoryError> {
        self.file.steps.upsert(
            step,
            StepRecord {
                done: false,
                result: error,
                completed_at: None,
            },
        );
        self.save()
    }

    /// Rewind `step` so it can run again. Later steps are untouched.
    pub fn reset(&mut self, step: &str) -> Result<(), MemoryError> {
        self.reset_with(step, false)
    }

    /// Rewind `step`; with `cascade` every step after it is rewound too.
    pub fn reset_with(&mut self, step: &str, cascade: bool) -> Result<(), MemoryError> {
        let Some(position) = self.file.steps.position(step) else {
            return Ok(());
        };
        let end = if cascade {
            self.file.steps.0.len()
        } else {
            position + 1
        };
        for (_, record) in &mut self.file.steps.0[position..end] {
            record.done = false;
            record.result = Value::Null;
            record.completed_at = None;
        }
        self.save()
    }

    pub fn completed_steps(&self) -> Vec<String> {
        self.file
            .steps
            .0
            .iter()
            .filter(|(_, r)| r.done)
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn is_complete(&self, step: &str) -> bool {
        self.file.steps.get(step).is_some_and(|r| r.done)
    }

    pub fn result(&self, step: &str) -> Option<&Value> {
        self.file.steps.get(step).map(|r| &r.result)
    }

    pub fn mark_complete(&mut self) -> Result<(), MemoryError> {
        self.file.status = RunStatus::Complete;
        self.save()
    }

    pub fn mark_failed(&mut self) -> Result<(), MemoryError> {
        self.file.status = RunStatus::Failed;
        self.save()
    }

    /// Persist atomically. A failed write surfaces and leaves the previous
    /// file intact; callers may retry.
    fn save(&self) -> Result<(), MemoryError> {
        let json = serde_json::to_string_pretty(&self.file).map_err(|e| {
            MemoryError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        atomic_write(&self.path, &json)
    }
}
