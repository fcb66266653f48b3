//! The public façade over the memory and security pipeline.
//!
//! One `ContextManager` exclusively owns its observation log, audit chain,
//! and anchor for its lifetime, and is the single write path into them. All
//! operations are synchronous and run on the caller's thread.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::debug;

use mnemo_core::adapter::LlmAdapter;
use mnemo_core::clock::{Clock, SystemClock};
use mnemo_core::config::MemoryConfig;
use mnemo_core::errors::MemoryError;
use mnemo_core::messages::{Role, SessionMessage};
use mnemo_core::observation::{Observation, Priority};
use mnemo_core::provenance::{ProvenanceTag, WriteSource};
use mnemo_core::tokens::{CharEstimator, Tokenizer};
use mnemo_guard::{Anchor, Sanitizer};
use mnemo_store::{ObservationStore, SessionLog};

use crate::context_builder::ContextBuilder;
use crate::observer::Observer;
use crate::reflector::Reflector;

/// Marker passed to the Observer when a pipeline run finished, producing the
/// 🟢 `Run #… completed in …` summary observation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunCompletion {
    pub run_id: String,
    pub elapsed: Duration,
}

pub struct ContextManager {
    config: MemoryConfig,
    clock: Arc<dyn Clock>,
    tokenizer: Arc<dyn Tokenizer>,
    store: ObservationStore,
    sessions: SessionLog,
    sanitizer: Sanitizer,
    observer: Observer,
    reflector: Reflector,
    anchor: Anchor,
    session_id: String,
    buffer: Vec<SessionMessage>,
    completed_run: Option<RunCompletion>,
}

impl ContextManager {
    /// Wire up the full pipeline with the system clock and the default
    /// char-based token estimator.
    pub fn new(
        config: MemoryConfig,
        llm: Arc<dyn LlmAdapter>,
        task_anchor: &str,
    ) -> Result<Self, MemoryError> {
        Self::with_capabilities(
            config,
            llm,
            Arc::new(SystemClock),
            Arc::new(CharEstimator),
            task_anchor,
        )
    }

    /// Full capability injection; tests pin the clock here.
    pub fn with_capabilities(
        config: MemoryConfig,
        llm: Arc<dyn LlmAdapter>,
        clock: Arc<dyn Clock>,
        tokenizer: Arc<dyn Tokenizer>,
        task_anchor: &str,
    ) -> Result<Self, MemoryError> {
        let now = clock.now();
        let store = ObservationStore::open(&config, now)?;
        let sessions = SessionLog::new(config.sessions_path());
        let sanitizer = Sanitizer::new(config.max_entry_chars);
        let observer = Observer::new(Arc::clone(&llm), sanitizer);
        let reflector = Reflector::new(llm);
        let anchor = Anchor::new(task_anchor, now);
        let session_id = now.format("session-%Y%m%dT%H%M%S").to_string();

        Ok(Self {
            config,
            clock,
            tokenizer,
            store,
            sessions,
            sanitizer,
            observer,
            reflector,
            anchor,
            session_id,
            buffer: Vec::new(),
            completed_run: None,
        })
    }

    /// Override the derived session id (one transcript file per id).
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    pub fn store(&self) -> &ObservationStore {
        &self.store
    }

    pub fn buffered_messages(&self) -> usize {
        self.buffer.len()
    }

    // ── Read path ───────────────────────────────────────────────────────

    /// Stable Block 1 prefix: task anchor section plus the rendered
    /// observation log. Byte-identical across calls while the log and
    /// today's date are unchanged.
    pub fn build_prefix(&self) -> Result<String, MemoryError> {
        self.build_prefix_on(self.clock.today())
    }

    fn build_prefix_on(&self, today: NaiveDate) -> Result<String, MemoryError> {
        let loaded = self.store.load()?;
        let mut parts = Vec::new();
        if let Some(anchor) = self.anchor.render() {
            parts.push(anchor);
        }
        let block1 = ContextBuilder::block1(&loaded.observations, today);
        if !block1.is_empty() {
            parts.push(block1);
        }
        Ok(parts.join("\n\n"))
    }

    /// Block 1 + Block 2 as a single string. The result always starts with
    /// the exact bytes of [`Self::build_prefix`].
    pub fn build(&self) -> Result<String, MemoryError> {
        let today = self.clock.today();
        let prefix = self.build_prefix_on(today)?;
        let session = ContextBuilder::block2(&self.buffer);
        Ok(match (prefix.is_empty(), session.is_empty()) {
            (false, false) => format!("{prefix}\n{session}"),
            (false, true) => prefix,
            (true, false) => session,
            (true, true) => String::new(),
        })
    }

    // ── Session buffering ───────────────────────────────────────────────

    /// Record an internally produced message; fires the Observer when the
    /// buffered token count crosses the threshold.
    pub fn add_message(
        &mut self,
        role: Role,
        content: impl Into<String>,
    ) -> Result<(), MemoryError> {
        self.push_message(SessionMessage::new(role, content))
    }

    /// Record a message carrying untrusted external content.
    pub fn add_external_message(
        &mut self,
        role: Role,
        content: impl Into<String>,
        origin: Option<String>,
    ) -> Result<(), MemoryError> {
        self.push_message(SessionMessage::external(role, content, origin))
    }

    fn push_message(&mut self, message: SessionMessage) -> Result<(), MemoryError> {
        self.sessions.append(&self.session_id, &message)?;
        self.buffer.push(message);
        if self.buffered_tokens() >= self.config.observer_threshold {
            self.run_observer()?;
        }
        Ok(())
    }

    fn buffered_tokens(&self) -> u32 {
        self.buffer
            .iter()
            .map(|m| self.tokenizer.count(&m.content))
            .sum()
    }

    /// Force an Observer pass over whatever is buffered.
    pub fn flush(&mut self) -> Result<Vec<Observation>, MemoryError> {
        self.run_observer()
    }

    fn run_observer(&mut self) -> Result<Vec<Observation>, MemoryError> {
        if self.buffer.is_empty() && self.completed_run.is_none() {
            return Ok(Vec::new());
        }
        let written = self.observer.compress(
            &self.store,
            self.clock.as_ref(),
            &self.buffer,
            self.completed_run.as_ref(),
        )?;
        // Only a fully successful pass drains the buffer; on error the
        // messages stay queued for retry.
        self.buffer.clear();
        self.completed_run = None;
        self.maybe_reflect()?;
        Ok(written)
    }

    fn maybe_reflect(&mut self) -> Result<(), MemoryError> {
        if self.store.size_tokens(self.tokenizer.as_ref())? >= self.config.reflector_threshold {
            self.reflector.reflect(&self.store, self.clock.as_ref())?;
        }
        Ok(())
    }

    /// Run the Reflector immediately, regardless of the threshold.
    pub fn reflect(&mut self) -> Result<bool, MemoryError> {
        self.reflector.reflect(&self.store, self.clock.as_ref())
    }

    // ── Direct writes ───────────────────────────────────────────────────

    /// Manually write one observation. The text may begin with a priority
    /// marker (defaults to 🟢); sanitizer truncation escalates it to 🔴.
    pub fn observe(
        &mut self,
        text: &str,
        event_date: Option<NaiveDate>,
    ) -> Result<Observation, MemoryError> {
        let (priority, text) = match Priority::strip_from(text.trim()) {
            Some((priority, rest)) => {
                (priority, rest.trim_start_matches([':', '-', ' ', '\t']).trim())
            }
            None => (Priority::Green, text.trim()),
        };

        let outcome = self.sanitizer.clean_internal(text);
        let priority = if outcome.was_truncated() {
            Priority::Red
        } else {
            priority
        };

        let today = self.clock.today();
        let obs = Observation::new(priority, today, outcome.text)
            .with_event_date(event_date.unwrap_or(today));
        let tag = ProvenanceTag::internal(WriteSource::Manual, self.clock.now(), &obs.body);
        self.store.append(&obs, tag)?;
        Ok(obs)
    }

    /// Tell the next Observer pass that a pipeline run finished, so it emits
    /// the 🟢 summary observation.
    pub fn mark_run_complete(&mut self, run_id: impl Into<String>, elapsed: Duration) {
        self.completed_run = Some(RunCompletion {
            run_id: run_id.into(),
            elapsed,
        });
    }

    // ── Intent anchoring ────────────────────────────────────────────────

    /// Gate `candidate` against the task anchor. On drift a 🔴 observation
    /// is appended (`source=anchor`) and the advisory error is returned;
    /// the caller decides whether to abort.
    pub fn check_instruction(&mut self, candidate: &str) -> Result<(), MemoryError> {
        let threshold = self.config.anchor_drift_threshold;
        let check = self.anchor.check(candidate, threshold);
        if !check.drifted {
            return Ok(());
        }

        let outcome = self.sanitizer.clean_internal(candidate);
        let body = format!(
            "Instruction drifted from task anchor (overlap {:.2}): {}",
            check.score, outcome.text
        );
        let today = self.clock.today();
        let obs = Observation::new(Priority::Red, today, body);
        let tag = ProvenanceTag::internal(WriteSource::Anchor, self.clock.now(), &obs.body);
        self.store.append(&obs, tag)?;
        debug!(score = check.score, "drift observation appended");

        Err(MemoryError::ContextDrift {
            score: check.score,
            threshold,
        })
    }

    // ── Integrity ───────────────────────────────────────────────────────

    /// True when the observation file still matches the audit chain tail.
    /// Non-tamper failures (I/O, broken chain) propagate.
    pub fn verify_integrity(&self) -> Result<bool, MemoryError> {
        match self.store.load() {
            Ok(_) => Ok(true),
            Err(MemoryError::TamperDetected { .. }) => Ok(false),
            Err(other) => Err(other),
        }
    }
}
