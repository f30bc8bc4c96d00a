//! HTML report generation
//!
//! Renders one self-contained page per run: audio player, summary (with the
//! model's reasoning folded out separately) and the chat as a table.

use pulldown_cmark::{html, Event, Options, Parser};

use crate::error::{Error, Result};
use crate::message::Message;
use crate::summarizer::split_thinking;

/// Which sections the report carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSections {
    pub chat: bool,
    pub summary: bool,
    pub audio: bool,
}

pub struct ReportInput<'a> {
    /// Channel name as used in output paths (already escaped).
    pub channel: &'a str,
    pub messages: &'a [Message],
    pub summary: &'a str,
    /// Audio file name, relative to the report.
    pub audio_file: &'a str,
    pub sections: ReportSections,
}

/// Render the report page. The heading is dated from the first message, so
/// a run without messages has no report.
pub fn render_report(input: &ReportInput<'_>) -> Result<String> {
    let first = input.messages.first().ok_or(Error::NoMessages)?;
    let channel = html_escape(input.channel);

    let mut body = String::new();
    if input.sections.audio {
        body.push_str(&render_audio(input.audio_file));
    }
    if input.sections.summary {
        body.push_str(&render_summary(input.summary));
    }
    if input.sections.chat {
        body.push_str(&render_chat(input.messages));
    }

    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Chat Summary for {channel}</title>
    <style>{css}</style>
</head>
<body>
    <h1>Chat Summary for {channel} on {date}</h1>
{body}</body>
</html>
"#,
        css = inline_css(),
        date = first.timestamp.format("%Y-%m-%d"),
    ))
}

fn render_audio(audio_file: &str) -> String {
    format!(
        r#"    <h2>Audio Summary</h2>
    <audio src="{}" controls></audio>
"#,
        html_escape(audio_file)
    )
}

fn render_summary(summary: &str) -> String {
    let split = split_thinking(summary);
    let thinking: String = split
        .thinking
        .iter()
        .map(|part| format!("<p>{}</p>", html_escape(part)))
        .collect();

    format!(
        r#"    <h2>Summary</h2>
    {answer}
    <h2>Thinking</h2>
    <i>{thinking}</i>
"#,
        answer = markdown_to_html(&split.answer),
    )
}

fn render_chat(messages: &[Message]) -> String {
    let mut rows = String::new();
    for message in messages {
        rows.push_str(&format!(
            r#"        <tr id="t{id}">
            <td class="time">{time}</td>
            <td class="nick">{nick}</td>
            <td class="text">{text}</td>
        </tr>
"#,
            id = message.timestamp.format("%Y-%m-%dT%H:%M:%S"),
            time = message.timestamp.format("%H:%M"),
            nick = html_escape(&message.nickname),
            text = html_escape(&message.text),
        ));
    }

    format!(
        r#"    <h2>Chat</h2>
    <table class="irclog">
{rows}    </table>
"#
    )
}

/// Markdown to HTML, with single newlines kept as line breaks.
fn markdown_to_html(text: &str) -> String {
    let parser = Parser::new_ext(text, Options::ENABLE_TABLES).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn inline_css() -> &'static str {
    r#"
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, Cantarell, sans-serif;
            line-height: 1.6;
            max-width: 800px;
            margin: 0 auto;
            padding: 20px;
            background-color: #f8f9fa;
            color: #333;
        }
        h1, h2 {
            color: #2c3e50;
            border-bottom: 2px solid #3498db;
            padding-bottom: 10px;
        }
        audio {
            width: 100%;
            margin: 20px 0;
        }
        pre {
            background-color: #f4f4f4;
            border: 1px solid #ddd;
            border-radius: 4px;
            padding: 15px;
            overflow-x: auto;
            font-size: 14px;
        }
        i {
            color: #7f8c8d;
            font-style: italic;
        }
        p { margin-bottom: 16px; }
        ul, ol {
            margin-bottom: 16px;
            padding-left: 30px;
        }
        li { margin-bottom: 8px; }
        code {
            background-color: #f1f2f6;
            padding: 2px 4px;
            border-radius: 3px;
            font-family: 'Monaco', 'Menlo', 'Ubuntu Mono', monospace;
        }
        table.irclog {
            width: 100%;
            border-collapse: collapse;
        }
        table.irclog td {
            padding: 8px;
            text-align: left;
            vertical-align: top;
        }
        table.irclog td.nick {
            font-weight: bold;
            text-align: right;
        }
    "#
}
