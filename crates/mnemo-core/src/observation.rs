//! Observation entries and the tolerant log grammar.
//!
//! An observation is a dated, priority-tagged record that survives across
//! sessions. Storage form and render form differ in one field only: the
//! `relative` lag is derived from today's date at render time and never
//! stored, so the stored file stays byte-stable between writes.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::MemoryError;
use crate::messages::Trust;

/// Priority marker. Red entries must influence the next run, yellow entries
/// are signals worth tracking, green entries are routine context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Red,
    Yellow,
    Green,
}

impl Priority {
    pub const fn emoji(self) -> &'static str {
        match self {
            Self::Red => "\u{1F534}",
            Self::Yellow => "\u{1F7E1}",
            Self::Green => "\u{1F7E2}",
        }
    }

    /// Match a leading priority emoji; returns the marker and its byte length.
    pub fn strip_from(text: &str) -> Option<(Self, &str)> {
        for priority in [Self::Red, Self::Yellow, Self::Green] {
            if let Some(rest) = text.strip_prefix(priority.emoji()) {
                return Some((priority, rest));
            }
        }
        None
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.emoji())
    }
}

/// One entry in the observation log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub priority: Priority,
    /// When the entry was written.
    pub observed_on: NaiveDate,
    /// When the underlying event happened (≤ `observed_on`).
    pub event_date: NaiveDate,
    pub trust: Trust,
    /// URL or file path the content came from, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    pub body: String,
}

impl Observation {
    /// Internal-trust observation observed and dated `on`.
    pub fn new(priority: Priority, on: NaiveDate, body: impl Into<String>) -> Self {
        Self {
            priority,
            observed_on: on,
            event_date: on,
            trust: Trust::Internal,
            origin: None,
            body: body.into(),
        }
    }

    pub fn with_event_date(mut self, event_date: NaiveDate) -> Self {
        self.event_date = event_date;
        self
    }

    pub fn with_trust(mut self, trust: Trust, origin: Option<String>) -> Self {
        self.trust = trust;
        self.origin = origin;
        self
    }

    pub fn is_external(&self) -> bool {
        self.trust == Trust::External
    }

    /// Human lag bucket between `today` and the event date.
    ///
    /// Buckets: `0_days_ago`, `1_day_ago`, `{n}_days_ago`, `{n}_weeks_ago`
    /// (n ≥ 2), `{n}_months_ago` (n ≥ 2), `1_year_ago` / `{n}_years_ago`.
    /// Future event dates clamp to `0_days_ago`.
    pub fn relative(&self, today: NaiveDate) -> String {
        relative_lag(today, self.event_date)
    }

    /// Storage form written to `observations.md`. No `relative` field.
    pub fn serialize(&self) -> String {
        let mut header = format!(
            "{} observed_on:{} event_date:{}",
            self.priority, self.observed_on, self.event_date
        );
        if self.is_external() {
            header.push_str(" [EXT]");
        }
        if let Some(origin) = &self.origin {
            header.push_str(" origin:");
            header.push_str(origin);
        }
        format!("{header}\n{}", self.body)
    }

    /// Render form injected into the context window. Pure in
    /// (`self`, `today`), which keeps the assembled prefix byte-stable
    /// whenever the log is unchanged.
    pub fn render(&self, today: NaiveDate) -> String {
        let ext = if self.is_external() { " [EXT]" } else { "" };
        let mut header = format!(
            "{}{ext} observed_on:{} event_date:{} relative:{}",
            self.priority,
            self.observed_on,
            self.event_date,
            self.relative(today)
        );
        if let Some(origin) = &self.origin {
            header.push_str(" origin:");
            header.push_str(origin);
        }
        format!("{header}\n{}", self.body)
    }

    /// Parse one entry block (header line + body) with the tolerant grammar:
    /// priority emoji, optional `:`/`-`/whitespace separators, then
    /// whitespace-separated `key:value` tokens. `relative:` and unknown keys
    /// are ignored; `[EXT]` is accepted anywhere after the emoji; a missing
    /// `event_date` defaults to `observed_on`.
    pub fn parse_entry(block: &str) -> Result<Self, MemoryError> {
        let block = block.trim();
        let (header, body) = match block.split_once('\n') {
            Some((header, body)) => (header, body.trim()),
            None => (block, ""),
        };

        let (priority, rest) = Priority::strip_from(header).ok_or_else(|| malformed("no priority marker"))?;
        let rest = rest.trim_start_matches([':', '-', ' ', '\t']);

        let mut observed_on: Option<NaiveDate> = None;
        let mut event_date: Option<NaiveDate> = None;
        let mut origin: Option<String> = None;
        let mut external = false;

        for token in rest.split_whitespace() {
            if token == "[EXT]" {
                external = true;
                continue;
            }
            let Some((key, value)) = token.split_once(':') else {
                continue;
            };
            match key {
                "observed_on" => {
                    observed_on =
                        Some(parse_date(value).ok_or_else(|| malformed("bad observed_on date"))?);
                }
                "event_date" => {
                    event_date =
                        Some(parse_date(value).ok_or_else(|| malformed("bad event_date date"))?);
                }
                // Only the first colon splits, so URL colons survive in `value`.
                "origin" => origin = Some(value.to_owned()),
                // Legacy stored field, recomputed at render time.
                "relative" => {}
                _ => {}
            }
        }

        let observed_on = observed_on.ok_or_else(|| malformed("missing observed_on"))?;
        Ok(Self {
            priority,
            observed_on,
            event_date: event_date.unwrap_or(observed_on),
            trust: if external { Trust::External } else { Trust::Internal },
            origin,
            body: body.to_owned(),
        })
    }
}

fn malformed(reason: &str) -> MemoryError {
    MemoryError::MalformedEntry {
        reason: reason.to_owned(),
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// See [`Observation::relative`].
pub fn relative_lag(today: NaiveDate, event_date: NaiveDate) -> String {
    let days = (today - event_date).num_days().max(0);
    match days {
        0 => "0_days_ago".to_owned(),
        1 => "1_day_ago".to_owned(),
        2..=13 => format!("{days}_days_ago"),
        14..=59 => format!("{}_weeks_ago", days / 7),
        60..=364 => format!("{}_months_ago", days / 30),
        _ => {
            let years = days / 365;
            if years == 1 {
                "1_year_ago".to_owned()
            } else {
                format!("{years}_years_ago")
            }
        }
    }
}

/// Result of parsing a full log file.
#[derive(Clone, Debug, Default)]
pub struct ParsedLog {
    pub observations: Vec<Observation>,
    /// Entries skipped because they failed the header grammar.
    pub malformed: usize,
}

/// Split raw log text on blank-line boundaries and parse each block.
/// Malformed blocks are skipped and counted; single newlines inside a body
/// are preserved.
pub fn parse_log(raw: &str) -> ParsedLog {
    let mut parsed = ParsedLog::default();
    for block in split_entries(raw) {
        match Observation::parse_entry(block) {
            Ok(obs) => parsed.observations.push(obs),
            Err(_) => parsed.malformed += 1,
        }
    }
    parsed
}

fn split_entries(raw: &str) -> impl Iterator<Item = &str> {
    raw.split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
}

/// Serialize a sequence of observations into the file grammar: entries
/// separated by one blank line, trailing newline when non-empty.
pub fn serialize_log(observations: &[Observation]) -> String {
    if observations.is_empty() {
        return String::new();
    }
    let mut out = observations
        .iter()
        .map(Observation::serialize)
        .collect::<Vec<_>>()
        .join("\n\n");
    out.push('\n');
    out
}
