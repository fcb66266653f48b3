//! Threshold-triggered consolidation of the observation log.

use std::sync::Arc;

use tracing::{info, warn};

use mnemo_core::adapter::{ChatMessage, LlmAdapter};
use mnemo_core::clock::Clock;
use mnemo_core::errors::MemoryError;
use mnemo_core::observation::parse_log;
use mnemo_core::provenance::{ProvenanceTag, WriteSource};
use mnemo_store::ObservationStore;

const REFLECTOR_PROMPT: &str = "\
You are a memory consolidation agent for an AI agent system.

You will receive an observation log. Your job is to consolidate it:
1. Merge related or redundant observations into single, more precise entries
2. Remove observations that have been fully superseded by newer ones
3. Preserve all three priority markers (\u{1F534}, \u{1F7E1}, \u{1F7E2}) exactly as-is
4. For merged entries, keep the most recent observed_on date and the earliest \
event_date
5. Keep every \u{1F534} entry unless it is genuinely superseded and resolved
6. Keep URLs and file paths intact

Return the consolidated log in EXACTLY this format with no other text:

PRIORITY observed_on:YYYY-MM-DD event_date:YYYY-MM-DD
Observation text here

PRIORITY observed_on:YYYY-MM-DD event_date:YYYY-MM-DD [EXT]
External observation text here

Separate each entry with a single blank line.";

/// The only destructive writer in the system. Reads the whole log, asks the
/// LLM for a consolidated version, and replaces the file. If the response
/// parses to nothing the log is left untouched.
pub struct Reflector {
    llm: Arc<dyn LlmAdapter>,
}

impl Reflector {
    pub fn new(llm: Arc<dyn LlmAdapter>) -> Self {
        Self { llm }
    }

    /// Consolidate the log in place. Returns `Ok(true)` when the log was
    /// rewritten, `Ok(false)` when skipped (empty log, empty response, or
    /// the zero-parse safety guard).
    pub fn reflect(
        &self,
        store: &ObservationStore,
        clock: &dyn Clock,
    ) -> Result<bool, MemoryError> {
        // Verified read; tamper surfaces before any LLM call.
        let loaded = store.load()?;
        if loaded.observations.is_empty() {
            return Ok(false);
        }
        let raw = store.read_raw()?;

        let response = self
            .llm
            .complete(REFLECTOR_PROMPT, &[ChatMessage::user(raw)])?;

        let parsed = parse_log(&response);
        if parsed.observations.is_empty() {
            // Never destroy the log on an unparseable response.
            if !response.trim().is_empty() {
                warn!(
                    response_chars = response.chars().count(),
                    "reflector skipped: response produced zero parseable entries"
                );
            }
            return Ok(false);
        }

        let tag = ProvenanceTag::internal(WriteSource::Reflector, clock.now(), &response);
        store.rewrite(&parsed.observations, tag)?;
        info!(
            before = loaded.observations.len(),
            after = parsed.observations.len(),
            "reflector consolidated observation log"
        );
        Ok(true)
    }
}
