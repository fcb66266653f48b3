use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::sha256_hex;
use crate::messages::Trust;

/// Which component performed a write to the observation log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteSource {
    /// The record written when a fresh store is initialized.
    Init,
    Observer,
    Reflector,
    Manual,
    /// Automatic 🔴 entry appended on a drift warning.
    Anchor,
}

impl std::fmt::Display for WriteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => f.write_str("init"),
            Self::Observer => f.write_str("observer"),
            Self::Reflector => f.write_str("reflector"),
            Self::Manual => f.write_str("manual"),
            Self::Anchor => f.write_str("anchor"),
        }
    }
}

/// Per-write provenance, constructed before the write and persisted inline in
/// the audit record that follows it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceTag {
    pub source: WriteSource,
    pub trust: Trust,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    pub ts: DateTime<Utc>,
    /// SHA-256 of the written content (the entry body for appends, the whole
    /// new log for rewrites).
    pub content_sha256: String,
}

impl ProvenanceTag {
    pub fn new(
        source: WriteSource,
        trust: Trust,
        origin: Option<String>,
        ts: DateTime<Utc>,
        content: &str,
    ) -> Self {
        Self {
            source,
            trust,
            origin,
            ts,
            content_sha256: sha256_hex(content.as_bytes()),
        }
    }

    /// Internal-trust tag with no origin, the common case for writes
    /// generated inside the agent loop.
    pub fn internal(source: WriteSource, ts: DateTime<Utc>, content: &str) -> Self {
        Self::new(source, Trust::Internal, None, ts, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_display_matches_wire_names() {
        assert_eq!(WriteSource::Init.to_string(), "init");
        assert_eq!(WriteSource::Observer.to_string(), "observer");
        assert_eq!(WriteSource::Anchor.to_string(), "anchor");
    }

    #[test]
    fn tag_hashes_content() {
        let ts = Utc::now();
        let tag = ProvenanceTag::internal(WriteSource::Manual, ts, "body");
        assert_eq!(tag.content_sha256, sha256_hex(b"body"));
        assert_eq!(tag.trust, Trust::Internal);
    }

    #[test]
    fn serde_roundtrip() {
        let tag = ProvenanceTag::new(
            WriteSource::Observer,
            Trust::External,
            Some("https://example".into()),
            Utc::now(),
            "content",
        );
        let json = serde_json::to_string(&tag).unwrap();
        let back: ProvenanceTag = serde_json::from_str(&json).unwrap();
        assert_eq!(tag, back);
    }
}
