//! Chat transcript assembly.
//!
//! Walks the messages of one run in order and renders two transcripts: one
//! for people (file and console, verbosity up to the caller) and one plain
//! rendering that is fed to the summarizer.

use crate::message::{Message, NicknameSet};

#[derive(Debug, Clone, Copy, Default)]
pub struct TranscriptOptions {
    /// Prefix each attributed turn with its timestamp.
    pub verbose: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    /// Rendering for display, honouring `TranscriptOptions::verbose`.
    pub verbose: String,
    /// Rendering for the summarizer. Never carries timestamps.
    pub plain: String,
}

impl Transcript {
    /// Render `messages` in the order given. `nicknames` must already hold
    /// every speaker of the run so replies to later speakers are detected.
    pub fn assemble(messages: &[Message], nicknames: &NicknameSet, options: &TranscriptOptions) -> Self {
        Self {
            verbose: render(messages, nicknames, options.verbose),
            plain: render(messages, nicknames, false),
        }
    }
}

/// Single pass, threading the previous message forward.
pub fn render(messages: &[Message], nicknames: &NicknameSet, verbose: bool) -> String {
    let (_, out) = messages.iter().fold(
        (None::<&Message>, String::new()),
        |(previous, mut out), message| {
            out.push_str(&message.format(previous, nicknames, verbose));
            (Some(message), out)
        },
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(14, minute, 0)
            .unwrap()
    }

    fn nicks(names: &[&str]) -> NicknameSet {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn conversation() -> Vec<Message> {
        vec![
            Message::new(at(1), "alice", "hello there"),
            Message::new(at(2), "alice", "how are you"),
            Message::new(at(3), "bob", "alice: good thanks"),
        ]
    }

    /// Split a plain rendering back into message bodies. Attributed turns
    /// start with `\n<nick> said:\n` or `\n<nick> replied to <nick>:\n`;
    /// collapsed turns are glued onto the previous body, so they come back
    /// merged with it.
    fn split_bodies(plain: &str) -> Vec<String> {
        plain
            .split('\n')
            .filter(|line| !line.is_empty())
            .filter(|line| !(line.ends_with(" said:") || (line.contains(" replied to ") && line.ends_with(':'))))
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_conversation_plain_rendering() {
        let t = Transcript::assemble(&conversation(), &nicks(&["alice", "bob"]), &TranscriptOptions::default());
        assert_eq!(
            t.plain,
            "\nalice said:\nhello there".to_string() + "how are you" + "\nbob replied to alice:\ngood thanks"
        );
        assert_eq!(t.verbose, t.plain);
    }

    #[test]
    fn test_verbose_does_not_leak_into_plain() {
        let t = Transcript::assemble(
            &conversation(),
            &nicks(&["alice", "bob"]),
            &TranscriptOptions { verbose: true },
        );
        assert_eq!(
            t.verbose,
            "\n2024-01-15 14:01:00\nalice said:\nhello there".to_string()
                + "how are you"
                + "\n2024-01-15 14:03:00\nbob replied to alice:\ngood thanks"
        );
        assert!(!t.plain.contains("2024-01-15"));
    }

    #[test]
    fn test_empty_input_renders_nothing() {
        let t = Transcript::assemble(&[], &nicks(&["alice"]), &TranscriptOptions { verbose: true });
        assert_eq!(t, Transcript::default());
        assert_eq!(t.verbose, "");
        assert_eq!(t.plain, "");
    }

    #[test]
    fn test_reply_to_later_speaker_is_detected() {
        // carol only speaks after being addressed
        let messages = vec![
            Message::new(at(1), "alice", "carol: are you around?"),
            Message::new(at(2), "carol", "yes"),
        ];
        let plain = render(&messages, &nicks(&["alice", "carol"]), false);
        assert_eq!(plain, "\nalice replied to carol:\nare you around?\ncarol said:\nyes");
    }

    #[test]
    fn test_bodies_recovered_in_order() {
        let messages = vec![
            Message::new(at(1), "alice", "first"),
            Message::new(at(2), "bob", "second"),
            Message::new(at(3), "alice", "bob: third"),
            Message::new(at(4), "carol", "fourth"),
        ];
        let plain = render(&messages, &nicks(&["alice", "bob", "carol"]), false);
        assert_eq!(split_bodies(&plain), vec!["first", "second", "third", "fourth"]);
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let names = nicks(&["alice", "bob"]);
        let options = TranscriptOptions { verbose: true };
        let first = Transcript::assemble(&conversation(), &names, &options);
        let second = Transcript::assemble(&conversation(), &names, &options);
        assert_eq!(first, second);
    }

    #[test]
    fn test_input_order_is_kept() {
        // out-of-order timestamps are rendered as given
        let messages = vec![
            Message::new(at(5), "bob", "later"),
            Message::new(at(1), "alice", "earlier"),
        ];
        let plain = render(&messages, &nicks(&[]), false);
        assert_eq!(plain, "\nbob said:\nlater\nalice said:\nearlier");
    }
}
