//! A single IRC log line and its rendering into chat narrative.
//!
//! Rendering collapses back-to-back lines from the same speaker and turns the
//! `nick: message` addressing convention into "X replied to Y" context.

use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDateTime;

/// Every distinct nickname seen in a run, after ignore-list filtering.
pub type NicknameSet = HashSet<String>;

/// One normalized chat event. Timestamps are naive UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub timestamp: NaiveDateTime,
    pub nickname: String,
    pub text: String,
}

impl Message {
    pub fn new(timestamp: NaiveDateTime, nickname: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            nickname: nickname.into(),
            text: text.into(),
        }
    }

    /// Render this message as it follows `previous` in the transcript.
    ///
    /// The attribution line (and, when `verbose`, the timestamp line) is
    /// dropped when `previous` has the same speaker. A leading nickname from
    /// `nicknames` marks a reply; the reply line is always emitted, even for
    /// a collapsed turn.
    pub fn format(&self, previous: Option<&Message>, nicknames: &NicknameSet, verbose: bool) -> String {
        let mut msg = self.text.as_str();
        let mut context = format!("\n{} said:\n", self.nickname);
        let mut timestamp = if verbose {
            format!("\n{}", self.timestamp)
        } else {
            String::new()
        };

        if previous.is_some_and(|prev| prev.nickname == self.nickname) {
            context.clear();
            timestamp.clear();
        }

        if let Some(replied) = reply_target(msg, nicknames) {
            msg = msg[replied.len()..].trim();
            if let Some(rest) = msg.strip_prefix(':') {
                msg = rest.trim();
            }
            context = format!("\n{} replied to {replied}:\n", self.nickname);
        }

        format!("{timestamp}{context}{msg}")
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] <{}> {}", self.timestamp, self.nickname, self.text)
    }
}

/// The nickname `text` is addressed to, if any.
///
/// Plain prefix match, so "bo" matches "bored now". When several nicknames
/// match, the longest wins: two different nicknames of the same length can't
/// both prefix the same text, so the result never depends on set order.
fn reply_target<'a>(text: &str, nicknames: &'a NicknameSet) -> Option<&'a str> {
    nicknames
        .iter()
        .filter(|nick| !nick.is_empty() && text.starts_with(nick.as_str()))
        .max_by_key(|nick| nick.len())
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn nicks(names: &[&str]) -> NicknameSet {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_first_message_gets_attribution() {
        let m = Message::new(at(14, 30, 25), "alice", "hello there");
        assert_eq!(m.format(None, &nicks(&[]), false), "\nalice said:\nhello there");
    }

    #[test]
    fn test_verbose_prefixes_timestamp() {
        let m = Message::new(at(14, 30, 25), "alice", "hello there");
        assert_eq!(
            m.format(None, &nicks(&[]), true),
            "\n2024-01-15 14:30:25\nalice said:\nhello there"
        );
    }

    #[test]
    fn test_same_speaker_collapses_attribution_and_timestamp() {
        let a = Message::new(at(14, 30, 25), "alice", "hello there");
        let b = Message::new(at(14, 30, 40), "alice", "how are you");
        assert_eq!(b.format(Some(&a), &nicks(&["alice"]), true), "how are you");
        assert_eq!(b.format(Some(&a), &nicks(&["alice"]), false), "how are you");
    }

    #[test]
    fn test_different_speaker_keeps_attribution() {
        let a = Message::new(at(14, 30, 25), "alice", "hello there");
        let b = Message::new(at(14, 31, 0), "bob", "hi");
        assert_eq!(b.format(Some(&a), &nicks(&[]), false), "\nbob said:\nhi");
    }

    #[test]
    fn test_reply_strips_nick_and_colon() {
        let m = Message::new(at(14, 32, 0), "bob", "alice: good thanks");
        assert_eq!(
            m.format(None, &nicks(&["alice", "bob"]), false),
            "\nbob replied to alice:\ngood thanks"
        );
    }

    #[test]
    fn test_reply_without_colon() {
        let m = Message::new(at(14, 32, 0), "bob", "alice  sounds good ");
        assert_eq!(
            m.format(None, &nicks(&["alice"]), false),
            "\nbob replied to alice:\nsounds good"
        );
    }

    #[test]
    fn test_reply_overrides_collapse_but_keeps_timestamp_cleared() {
        let a = Message::new(at(14, 30, 0), "bob", "one sec");
        let b = Message::new(at(14, 30, 5), "bob", "alice: done");
        assert_eq!(
            b.format(Some(&a), &nicks(&["alice", "bob"]), true),
            "\nbob replied to alice:\ndone"
        );
    }

    #[test]
    fn test_reply_keeps_timestamp_when_not_collapsed() {
        let m = Message::new(at(9, 0, 0), "bob", "alice: morning");
        assert_eq!(
            m.format(None, &nicks(&["alice"]), true),
            "\n2024-01-15 09:00:00\nbob replied to alice:\nmorning"
        );
    }

    #[test]
    fn test_prefix_match_is_not_word_aware() {
        let m = Message::new(at(9, 0, 0), "carol", "bored now");
        assert_eq!(
            m.format(None, &nicks(&["bo"]), false),
            "\ncarol replied to bo:\nred now"
        );
    }

    #[test]
    fn test_longest_nickname_wins() {
        let m = Message::new(at(9, 0, 0), "carol", "bobby: hi");
        let names = nicks(&["bob", "bobby", "b"]);
        for _ in 0..8 {
            assert_eq!(m.format(None, &names, false), "\ncarol replied to bobby:\nhi");
        }
    }

    #[test]
    fn test_empty_nickname_set_disables_replies() {
        let m = Message::new(at(9, 0, 0), "carol", "alice: hi");
        assert_eq!(m.format(None, &nicks(&[]), false), "\ncarol said:\nalice: hi");
    }

    #[test]
    fn test_message_equals_only_on_all_fields() {
        let a = Message::new(at(9, 0, 0), "carol", "hi");
        assert_eq!(a, Message::new(at(9, 0, 0), "carol", "hi"));
        assert_ne!(a, Message::new(at(9, 0, 1), "carol", "hi"));
        assert_ne!(a, Message::new(at(9, 0, 0), "dave", "hi"));
        assert_ne!(a, Message::new(at(9, 0, 0), "carol", "hi!"));
    }

    #[test]
    fn test_display() {
        let a = Message::new(at(9, 0, 0), "carol", "hi");
        assert_eq!(a.to_string(), "[2024-01-15 09:00:00] <carol> hi");
    }
}
