use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provenance::{ProvenanceTag, WriteSource};

/// One line of `audit.jsonl`. Records chain through `prev_sha256`: each
/// record's `prev_sha256` equals the previous record's `log_sha256` (the
/// empty-file hash for the first), so any out-of-band edit to the observation
/// file is detectable on the next load.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub ts: DateTime<Utc>,
    pub source: WriteSource,
    /// Signed change in log size, in chars.
    pub char_delta: i64,
    /// SHA-256 of the full observation file after the write.
    pub log_sha256: String,
    pub prev_sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<ProvenanceTag>,
}

impl AuditRecord {
    /// True when `next` correctly chains onto `self`.
    pub fn links_to(&self, next: &AuditRecord) -> bool {
        next.prev_sha256 == self.log_sha256
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::empty_hash;

    fn record(prev: &str, log: &str) -> AuditRecord {
        AuditRecord {
            ts: Utc::now(),
            source: WriteSource::Manual,
            char_delta: 10,
            log_sha256: log.into(),
            prev_sha256: prev.into(),
            provenance: None,
        }
    }

    #[test]
    fn chain_link_check() {
        let first = record(&empty_hash(), "aaaa");
        let second = record("aaaa", "bbbb");
        let broken = record("cccc", "dddd");
        assert!(first.links_to(&second));
        assert!(!first.links_to(&broken));
    }

    #[test]
    fn jsonl_roundtrip() {
        let rec = record(&empty_hash(), "aaaa");
        let line = serde_json::to_string(&rec).unwrap();
        let back: AuditRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(rec, back);
        // Provenance is omitted from the wire form when absent.
        assert!(!line.contains("provenance"));
    }

    #[test]
    fn source_serializes_lowercase() {
        let rec = record(&empty_hash(), "aaaa");
        let line = serde_json::to_string(&rec).unwrap();
        assert!(line.contains(r#""source":"manual""#));
    }
}
