//! Two-block context assembly.
//!
//! Block 1 (the observation log) is a pure function of the observation list
//! and today's date: identical inputs produce byte-identical output, which is
//! what makes the prefix provider-cacheable. Block 2 is the rolling session
//! region and changes every turn.

use chrono::NaiveDate;

use mnemo_core::messages::SessionMessage;
use mnemo_core::observation::Observation;

pub struct ContextBuilder;

impl ContextBuilder {
    /// Stable block: rendered observation log with render-time `relative`
    /// lags. Empty when there are no observations.
    pub fn block1(observations: &[Observation], today: NaiveDate) -> String {
        if observations.is_empty() {
            return String::new();
        }
        let rendered = observations
            .iter()
            .map(|obs| obs.render(today))
            .collect::<Vec<_>>()
            .join("\n\n");
        format!("<observation_log>\n{rendered}\n</observation_log>")
    }

    /// Rolling block: the current session's messages.
    pub fn block2(messages: &[SessionMessage]) -> String {
        if messages.is_empty() {
            return String::new();
        }
        let lines = messages
            .iter()
            .map(|msg| format!("[{}]: {}", msg.role, msg.content))
            .collect::<Vec<_>>()
            .join("\n");
        format!("<session>\n{lines}\n</session>")
    }

    /// Block 1 followed by Block 2. The result always starts with the exact
    /// bytes of `block1(observations, today)`.
    pub fn build(
        observations: &[Observation],
        messages: &[SessionMessage],
        today: NaiveDate,
    ) -> String {
        let block1 = Self::block1(observations, today);
        let block2 = Self::block2(messages);
        match (block1.is_empty(), block2.is_empty()) {
            (false, false) => format!("{block1}\n{block2}"),
            (false, true) => block1,
            (true, false) => block2,
            (true, true) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_core::messages::{Role, Trust};
    use mnemo_core::observation::Priority;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_observations() -> Vec<Observation> {
        vec![
            Observation::new(Priority::Red, date(2026, 2, 20), "OAuth token expired")
                .with_event_date(date(2026, 2, 18))
                .with_trust(Trust::External, Some("https://example".into())),
            Observation::new(Priority::Yellow, date(2026, 2, 15), "weaker narrations"),
        ]
    }

    #[test]
    fn block1_renders_entries_with_relative() {
        let block = ContextBuilder::block1(&sample_observations(), date(2026, 2, 20));
        assert!(block.starts_with("<observation_log>\n"));
        assert!(block.ends_with("\n</observation_log>"));
        assert!(block.contains("relative:2_days_ago"));
        assert!(block.contains("relative:5_days_ago"));
        assert!(block.contains("[EXT]"));
    }

    #[test]
    fn block1_empty_list_is_empty() {
        assert_eq!(ContextBuilder::block1(&[], date(2026, 2, 20)), "");
    }

    #[test]
    fn block1_is_pure_in_inputs() {
        let observations = sample_observations();
        let today = date(2026, 2, 20);
        assert_eq!(
            ContextBuilder::block1(&observations, today),
            ContextBuilder::block1(&observations, today)
        );
    }

    #[test]
    fn block1_changes_with_today() {
        let observations = sample_observations();
        assert_ne!(
            ContextBuilder::block1(&observations, date(2026, 2, 20)),
            ContextBuilder::block1(&observations, date(2026, 2, 21))
        );
    }

    #[test]
    fn build_starts_with_block1_for_any_session_tail() {
        let observations = sample_observations();
        let today = date(2026, 2, 20);
        let block1 = ContextBuilder::block1(&observations, today);

        let tail_a = vec![SessionMessage::new(Role::User, "first tail")];
        let tail_b = vec![
            SessionMessage::new(Role::User, "second"),
            SessionMessage::new(Role::Assistant, "tail"),
        ];
        assert!(ContextBuilder::build(&observations, &tail_a, today).starts_with(&block1));
        assert!(ContextBuilder::build(&observations, &tail_b, today).starts_with(&block1));
    }

    #[test]
    fn build_without_observations_is_session_only() {
        let messages = vec![SessionMessage::new(Role::User, "hello")];
        let built = ContextBuilder::build(&[], &messages, date(2026, 2, 20));
        assert_eq!(built, "<session>\n[user]: hello\n</session>");
    }

    #[test]
    fn build_empty_everything_is_empty() {
        assert_eq!(ContextBuilder::build(&[], &[], date(2026, 2, 20)), "");
    }

    #[test]
    fn block2_formats_roles() {
        let messages = vec![
            SessionMessage::new(Role::User, "question"),
            SessionMessage::new(Role::Assistant, "answer"),
            SessionMessage::new(Role::Tool, "output"),
        ];
        let block = ContextBuilder::block2(&messages);
        assert!(block.contains("[user]: question"));
        assert!(block.contains("[assistant]: answer"));
        assert!(block.contains("[tool]: output"));
    }
}
