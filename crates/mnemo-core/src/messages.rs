use serde::{Deserialize, Serialize};

/// Who produced a session message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Assistant => f.write_str("assistant"),
            Self::Tool => f.write_str("tool"),
        }
    }
}

/// Whether content entered the system from inside the agent loop or from an
/// untrusted outside source. External trust forces sanitization + wrapping
/// before the content can reach an LLM call, and an `[EXT]` marker wherever
/// it is rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trust {
    #[default]
    Internal,
    External,
}

/// A message buffered in the rolling session window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub trust: Trust,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl SessionMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            trust: Trust::Internal,
            origin: None,
        }
    }

    /// Message carrying untrusted external content, with its source when known.
    pub fn external(role: Role, content: impl Into<String>, origin: Option<String>) -> Self {
        Self {
            role,
            content: content.into(),
            trust: Trust::External,
            origin,
        }
    }

    pub fn is_external(&self) -> bool {
        self.trust == Trust::External
    }
}
