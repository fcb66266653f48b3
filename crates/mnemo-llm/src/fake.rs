//! Deterministic adapter for tests: scripted responses, no API calls.

use parking_lot::Mutex;

use mnemo_core::adapter::{ChatMessage, LlmAdapter};
use mnemo_core::errors::LlmError;

/// One recorded `complete` invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedCall {
    pub system: String,
    pub messages: Vec<ChatMessage>,
}

enum Script {
    /// The same response for every call.
    Fixed(String),
    /// One response per call, in order; exhaustion is an error.
    Sequence(Vec<Result<String, LlmError>>),
}

/// Scripted LLM double. Records every call for assertions.
pub struct FakeAdapter {
    script: Script,
    calls: Mutex<Vec<RecordedCall>>,
    cursor: Mutex<usize>,
}

impl FakeAdapter {
    /// Always answer with `response`.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self {
            script: Script::Fixed(response.into()),
            calls: Mutex::new(Vec::new()),
            cursor: Mutex::new(0),
        }
    }

    /// Answer with each scripted result in turn; a call past the end
    /// returns [`LlmError::EmptyResponse`].
    pub fn sequence(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Script::Sequence(responses),
            calls: Mutex::new(Vec::new()),
            cursor: Mutex::new(0),
        }
    }

    /// Always fail with `error`.
    pub fn failing(error: LlmError) -> Self {
        Self::sequence(vec![Err(error)])
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// The last call's user-visible content, for prompt assertions.
    pub fn last_call(&self) -> Option<RecordedCall> {
        self.calls.lock().last().cloned()
    }
}

impl LlmAdapter for FakeAdapter {
    fn name(&self) -> &str {
        "fake"
    }

    fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.calls.lock().push(RecordedCall {
            system: system.to_owned(),
            messages: messages.to_vec(),
        });
        match &self.script {
            Script::Fixed(response) => Ok(response.clone()),
            Script::Sequence(responses) => {
                let mut cursor = self.cursor.lock();
                let idx = *cursor;
                *cursor += 1;
                match responses.get(idx) {
                    Some(result) => result.clone(),
                    None => Err(LlmError::EmptyResponse),
                }
            }
        }
    }
}
