//! Threshold-triggered compression of session messages into observations.

use std::sync::Arc;

use tracing::{debug, warn};

use mnemo_core::adapter::{ChatMessage, LlmAdapter};
use mnemo_core::clock::Clock;
use mnemo_core::errors::MemoryError;
use mnemo_core::messages::{SessionMessage, Trust};
use mnemo_core::observation::{Observation, Priority};
use mnemo_core::provenance::{ProvenanceTag, WriteSource};
use mnemo_guard::Sanitizer;
use mnemo_store::ObservationStore;

use crate::manager::RunCompletion;

const OBSERVER_PROMPT: &str = "\
You are a memory extraction agent for an AI agent system.

Read the conversation messages below and extract key observations: facts, \
decisions, errors, warnings, and patterns that would be useful in future runs.

Format each observation as a single line starting with a priority marker:
  \u{1F534}  critical issues that MUST influence the next run (errors, failures, \
expired tokens, blocked paths)
  \u{1F7E1}  patterns and signals worth tracking (trends, anomalies, recurring themes)
  \u{1F7E2}  routine context (timing, metadata, completions, normal outcomes)

Rules:
- One observation per line, maximum ~200 characters
- Start each line with the emoji and a space, then the observation text
- Only include observations useful in future runs, skipping pleasantries and \
ephemeral details
- If nothing is worth recording, return an empty response";

/// Compresses drained session messages into sanitized, provenance-tagged
/// observations. External-sourced messages are cleaned and wrapped before
/// they reach the LLM; the resulting entries inherit external trust when any
/// input message was external.
pub struct Observer {
    llm: Arc<dyn LlmAdapter>,
    sanitizer: Sanitizer,
}

impl Observer {
    pub fn new(llm: Arc<dyn LlmAdapter>, sanitizer: Sanitizer) -> Self {
        Self { llm, sanitizer }
    }

    /// Compress `messages` into observations and append them to the store.
    ///
    /// On an adapter error nothing has been written and the caller keeps its
    /// buffer; each successful append is individually atomic and chained.
    pub fn compress(
        &self,
        store: &ObservationStore,
        clock: &dyn Clock,
        messages: &[SessionMessage],
        completed_run: Option<&RunCompletion>,
    ) -> Result<Vec<Observation>, MemoryError> {
        let mut written = Vec::new();
        let today = clock.today();

        if !messages.is_empty() {
            let transcript = self.format_transcript(messages);
            let any_external = messages.iter().any(SessionMessage::is_external);
            let trust = if any_external {
                Trust::External
            } else {
                Trust::Internal
            };

            let response = self
                .llm
                .complete(OBSERVER_PROMPT, &[ChatMessage::user(transcript)])?;

            for (priority, text) in parse_response(&response) {
                let outcome = self.sanitizer.clean_internal(&text);
                if outcome.text.is_empty() {
                    continue;
                }
                let priority = if outcome.was_truncated() {
                    Priority::Red
                } else {
                    priority
                };
                let obs =
                    Observation::new(priority, today, outcome.text).with_trust(trust, None);
                let tag = ProvenanceTag::new(
                    WriteSource::Observer,
                    trust,
                    None,
                    clock.now(),
                    &obs.body,
                );
                store.append(&obs, tag)?;
                written.push(obs);
            }
            debug!(
                messages = messages.len(),
                observations = written.len(),
                "observer compressed session buffer"
            );
            if written.is_empty() && !response.trim().is_empty() {
                warn!("observer response contained no parseable observations");
            }
        }

        if let Some(run) = completed_run {
            let obs = Observation::new(
                Priority::Green,
                today,
                format!("Run #{} completed in {}s", run.run_id, run.elapsed.as_secs()),
            );
            let tag = ProvenanceTag::internal(WriteSource::Observer, clock.now(), &obs.body);
            store.append(&obs, tag)?;
            written.push(obs);
        }

        Ok(written)
    }

    fn format_transcript(&self, messages: &[SessionMessage]) -> String {
        messages
            .iter()
            .map(|msg| {
                if msg.is_external() {
                    let wrapped = self
                        .sanitizer
                        .wrap_external(&msg.content, msg.origin.as_deref());
                    format!("[{}]: {wrapped}", msg.role)
                } else {
                    format!("[{}]: {}", msg.role, msg.content)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Parse an observer response: one observation per line, a priority emoji
/// followed by optional `:`/`-` separators and the body. Lines without a
/// marker are skipped.
fn parse_response(response: &str) -> Vec<(Priority, String)> {
    response
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let (priority, rest) = Priority::strip_from(line)?;
            let text = rest.trim_start_matches([':', '-', ' ', '\t']).trim();
            if text.is_empty() {
                return None;
            }
            Some((priority, text.to_owned()))
        })
        .collect()
}
