//! Error type shared by the fetch, summary, speech and report stages.
//!
//! Transcript formatting itself never fails; everything here comes from I/O
//! or from the external services around it.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    Url(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown timezone: {0}")]
    Timezone(String),

    #[error("Summarizer failed: {0}")]
    Summarizer(String),

    #[error("Speech synthesis failed: {0}")]
    Speech(String),

    #[error("No messages found")]
    NoMessages,
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
