use crate::errors::LlmError;
use crate::messages::Role;

/// A message in the shape adapters send to a provider. Sanitization and
/// external-content wrapping happen before construction; adapters treat the
/// content as opaque.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Narrow LLM transport capability consumed by the memory layer.
///
/// Implementations must not perform network I/O beyond their configured
/// endpoint, and must honor the deadline they were constructed with,
/// surfacing expiry as [`LlmError::Timeout`].
pub trait LlmAdapter: Send + Sync {
    /// Adapter name for logging.
    fn name(&self) -> &str;

    /// Send `messages` under `system` and return the full response text.
    fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String, LlmError>;
}
