//! Blocking Google Gemini adapter (`generateContent`).
//!
//! Gemini uses role `model` instead of `assistant` and has no system role in
//! the content list, so the system prompt is folded into the first user
//! message.

use std::time::Duration;

use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::instrument;

use mnemo_core::adapter::{ChatMessage, LlmAdapter};
use mnemo_core::errors::LlmError;
use mnemo_core::messages::Role;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

pub struct GeminiAdapter {
    client: Client,
    api_key: SecretString,
    model: String,
    deadline: Duration,
}

impl GeminiAdapter {
    pub fn new(api_key: SecretString, deadline: Duration) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(deadline)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;
        Ok(Self {
            client,
            api_key,
            model: DEFAULT_MODEL.to_owned(),
            deadline,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{API_BASE}/{}:generateContent", self.model)
    }
}

/// Convert chat messages to Gemini's content format, folding `system` into
/// the first user message.
fn to_contents(system: &str, messages: &[ChatMessage]) -> Vec<Value> {
    let mut system_pending = (!system.is_empty()).then(|| system.to_owned());
    messages
        .iter()
        .map(|msg| {
            let role = match msg.role {
                Role::Assistant => "model",
                Role::User | Role::Tool => "user",
            };
            let text = match (msg.role, system_pending.take()) {
                (Role::User, Some(system)) => format!("{system}\n\n{}", msg.content),
                (_, taken) => {
                    // Not a user message; keep waiting for one.
                    system_pending = taken;
                    msg.content.clone()
                }
            };
            json!({"role": role, "parts": [{"text": text}]})
        })
        .collect()
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

impl LlmAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        "gemini"
    }

    #[instrument(skip_all, fields(model = %self.model))]
    fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let body = json!({"contents": to_contents(system, messages)});

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.expose_secret())])
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.deadline)
                } else {
                    LlmError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), body));
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| LlmError::Network(e.to_string()))?;
        let text: String = parsed
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .concat()
            })
            .unwrap_or_default();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }
}

impl std::fmt::Debug for GeminiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiAdapter")
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
