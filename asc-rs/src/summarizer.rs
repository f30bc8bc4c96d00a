//! Ollama chat summarization.
//!
//! Streams a summary of the plain transcript from `/api/chat`, echoing each
//! chunk as it arrives so long generations show progress.

use std::io::Write;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::{Error, Result};

const SUMMARIZE_PROMPT: &str = r#"
You are an assistant that summarizes chat logs without additional commentary.
Use exclusively they/them pronouns when referring to people in this chat log.
Always reply in English.
Summarize the following chat log, do not include any other text in your response:

<chat>
{chat}
</chat>
"#;

/// Local models can take minutes on a long meeting.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

pub struct OllamaSummarizer {
    model: String,
    host: String,
    client: Client,
}

impl OllamaSummarizer {
    pub fn new(model: &str, host: &str) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            model: model.to_string(),
            host: host.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Summarize `chat`, echoing the streamed answer to stdout.
    pub async fn summarize(&self, chat: &str) -> Result<String> {
        let mut stdout = std::io::stdout();
        self.summarize_to(chat, &mut stdout).await
    }

    /// Summarize `chat`, echoing each streamed chunk to `echo`.
    pub async fn summarize_to(&self, chat: &str, echo: &mut impl Write) -> Result<String> {
        let t_start = Instant::now();
        let prompt = SUMMARIZE_PROMPT.replace("{chat}", chat);

        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": true,
        });

        let url = format!("{}/api/chat", self.host);
        debug!("Sending {} chars to Ollama model '{}'", chat.len(), self.model);

        let mut resp = self.client.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(Error::HttpStatus {
                url,
                status: resp.status().as_u16(),
            });
        }

        let mut summary = String::new();
        let mut pending: Vec<u8> = Vec::new();
        while let Some(bytes) = resp.chunk().await? {
            pending.extend_from_slice(&bytes);
            while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                apply_line(&line, &mut summary, echo)?;
            }
        }
        apply_line(&pending, &mut summary, echo)?;
        let _ = echo.flush();

        let latency_ms = t_start.elapsed().as_secs_f64() * 1000.0;
        info!("Summarized {} chars → {} chars ({latency_ms:.0}ms)", chat.len(), summary.len());
        Ok(summary)
    }
}

/// Fold one NDJSON line of the stream into `summary`.
fn apply_line(line: &[u8], summary: &mut String, echo: &mut impl Write) -> Result<()> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }

    let chunk: ChatChunk = serde_json::from_str(line)
        .map_err(|e| Error::Summarizer(format!("unreadable stream chunk: {e}")))?;
    if let Some(error) = chunk.error {
        return Err(Error::Summarizer(error));
    }
    if let Some(message) = chunk.message {
        let _ = echo.write_all(message.content.as_bytes());
        let _ = echo.flush();
        summary.push_str(&message.content);
    }
    if chunk.done {
        debug!("Ollama stream finished");
    }
    Ok(())
}

/// A reasoning model's reply, split into its thinking and its answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitSummary {
    pub thinking: Vec<String>,
    pub answer: String,
}

/// Everything after the last `</think>` is the answer; each block before it
/// is reasoning. A reply without think tags is all answer.
pub fn split_thinking(summary: &str) -> SplitSummary {
    let mut parts: Vec<&str> = summary.split(THINK_CLOSE).collect();
    let answer = parts.pop().unwrap_or_default().trim().to_string();
    let thinking = parts
        .into_iter()
        .map(|part| part.replace(THINK_OPEN, "").trim().to_string())
        .filter(|part| !part.is_empty())
        .collect();
    SplitSummary { thinking, answer }
}
