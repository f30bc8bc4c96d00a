//! Report pipeline for one run.
//!
//! FETCH → CHAT → SUMMARY → SPEECH → REPORT, with the summary and speech
//! stages only run when the output type asks for them.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use chrono::{Local, NaiveDateTime};
use clap::ValueEnum;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::{FetchConfig, OllamaConfig, OutputConfig, TtsConfig};
use crate::error::{Error, Result};
use crate::irclog::{compute_cutoff, IrcLogClient};
use crate::report::{render_report, ReportInput, ReportSections};
use crate::speech::{prepare_speech_text, write_wav, KokoroTtsEngine};
use crate::summarizer::OllamaSummarizer;
use crate::transcript::{Transcript, TranscriptOptions};

const CHAT_FILE: &str = "chat.txt";
const HTML_FILE: &str = "summary.html";
const WAV_FILE: &str = "summary.wav";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputType {
    /// Chat text
    #[value(name = "CHAT")]
    Chat,
    /// Summary of the chat as text
    #[value(name = "SUMMARY")]
    Summary,
    /// Summary of the chat as an audio file
    #[value(name = "SPEECH_SUMMARY")]
    SpeechSummary,
}

impl OutputType {
    pub fn sections(self) -> ReportSections {
        ReportSections {
            chat: true,
            summary: matches!(self, Self::Summary | Self::SpeechSummary),
            audio: self == Self::SpeechSummary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Chat,
    Summary,
    Speech,
    Report,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => write!(f, "FETCH"),
            Self::Chat => write!(f, "CHAT"),
            Self::Summary => write!(f, "SUMMARY"),
            Self::Speech => write!(f, "SPEECH"),
            Self::Report => write!(f, "REPORT"),
            Self::Done => write!(f, "DONE"),
        }
    }
}

/// Everything one run needs, resolved from config and CLI flags.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub fetch: FetchConfig,
    pub ollama: OllamaConfig,
    pub tts: TtsConfig,
    pub output: OutputConfig,
    pub output_type: OutputType,
    pub verbose: bool,
    /// Extra copy of the chat transcript.
    pub chat_file: Option<PathBuf>,
}

/// Files produced by one run, all inside a fresh per-run directory.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub channel: String,
    pub dir: PathBuf,
    pub chat_file: PathBuf,
    pub html_file: PathBuf,
    pub wav_file: PathBuf,
}

impl RunPaths {
    /// Create `{output_directory}/{channel}-{YYYY-MM-DD-HH-MM-SS}`.
    pub fn create(output_directory: &Path, channel: &str, now: NaiveDateTime) -> Result<Self> {
        let channel = encode_channel(channel);
        let dir = output_directory.join(format!("{channel}-{}", now.format("%Y-%m-%d-%H-%M-%S")));
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        debug!("Output directory {}", dir.display());

        Ok(Self {
            channel,
            chat_file: dir.join(CHAT_FILE),
            html_file: dir.join(HTML_FILE),
            wav_file: dir.join(WAV_FILE),
            dir,
        })
    }
}

/// Channel name safe for a path component: leading `#` dropped, everything
/// but ASCII alphanumerics and `-._~` percent-encoded.
pub fn encode_channel(channel: &str) -> String {
    let mut out = String::new();
    for b in channel.trim_start_matches('#').bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[derive(Debug)]
pub struct RunOutcome {
    pub paths: RunPaths,
    pub message_count: usize,
    /// `None` when there was nothing to report on.
    pub report: Option<PathBuf>,
}

pub struct ReportService {
    settings: RunSettings,
    stage: Stage,
}

impl ReportService {
    pub fn new(settings: RunSettings) -> Self {
        Self {
            settings,
            stage: Stage::Fetch,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub async fn run(&mut self) -> Result<RunOutcome> {
        self.run_at(Local::now().naive_local()).await
    }

    /// Run with `now_local` as the current wall-clock time.
    pub async fn run_at(&mut self, now_local: NaiveDateTime) -> Result<RunOutcome> {
        let settings = self.settings.clone();
        let fetch = &settings.fetch;
        info!("Fetching {} hours from channel {}", fetch.hours, fetch.channel);

        let paths = RunPaths::create(&settings.output.directory, &fetch.channel, now_local)?;

        let cutoff = compute_cutoff(now_local, &fetch.timezone, fetch.hours)?;
        debug!("Cutoff {cutoff} UTC");
        let client = IrcLogClient::new(&fetch.base_url)?;
        let collected = client
            .collect_messages(&fetch.channel, cutoff, &fetch.ignore_nicks)
            .await?;

        self.advance(Stage::Chat);
        let transcript = Transcript::assemble(
            &collected.messages,
            &collected.nicknames,
            &TranscriptOptions {
                verbose: settings.verbose,
            },
        );
        self.write_chat(&paths, &transcript.verbose)?;

        if collected.messages.is_empty() {
            warn!("No messages found in {} for the last {} hours", fetch.channel, fetch.hours);
            self.advance(Stage::Done);
            return Ok(RunOutcome {
                paths,
                message_count: 0,
                report: None,
            });
        }

        let sections = settings.output_type.sections();
        let mut summary = String::new();
        if sections.summary {
            self.advance(Stage::Summary);
            let summarizer = OllamaSummarizer::new(&settings.ollama.model, &settings.ollama.host)?;
            summary = summarizer.summarize(&transcript.plain).await?;
            println!();
        }

        if sections.audio {
            self.advance(Stage::Speech);
            let text = prepare_speech_text(&summary)?;
            let tts = settings.tts.clone();
            let wav_file = paths.wav_file.clone();
            tokio::task::spawn_blocking(move || -> Result<()> {
                let mut engine = KokoroTtsEngine::new(&tts);
                engine.load()?;
                let samples = engine.synthesize(&text)?;
                write_wav(&wav_file, &samples)
            })
            .await
            .map_err(|e| Error::Speech(format!("synthesis task failed: {e}")))??;
        }

        self.advance(Stage::Report);
        let html = render_report(&ReportInput {
            channel: &paths.channel,
            messages: &collected.messages,
            summary: &summary,
            audio_file: WAV_FILE,
            sections,
        })?;
        fs::write(&paths.html_file, html).map_err(|e| Error::io(&paths.html_file, e))?;
        info!("Generated HTML summary in {}", paths.html_file.display());

        if settings.output.open_browser {
            open_in_browser(&paths.html_file).await;
        }

        self.advance(Stage::Done);
        Ok(RunOutcome {
            report: Some(paths.html_file.clone()),
            message_count: collected.messages.len(),
            paths,
        })
    }

    fn advance(&mut self, next: Stage) {
        info!("Stage: {} → {next}", self.stage);
        self.stage = next;
    }

    /// Echo the transcript to stdout and save it with the run's files.
    fn write_chat(&self, paths: &RunPaths, chat: &str) -> Result<()> {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(chat.as_bytes());
        let _ = stdout.flush();

        fs::write(&paths.chat_file, chat).map_err(|e| Error::io(&paths.chat_file, e))?;
        if let Some(extra) = &self.settings.chat_file {
            fs::write(extra, chat).map_err(|e| Error::io(extra, e))?;
            info!("Wrote chat to {}", extra.display());
        }
        Ok(())
    }
}

async fn open_in_browser(path: &Path) {
    match launch("xdg-open", path).await {
        Ok(status) if status.success() => debug!("Opened {} in browser", path.display()),
        Ok(status) => warn!("xdg-open {} exited with {status}", path.display()),
        Err(e) => warn!("Failed to open {} in browser: {e}", path.display()),
    }
}

/// Run `program path` to completion. xdg-open hands off to the browser and
/// returns right away.
async fn launch(program: &str, path: &Path) -> std::io::Result<ExitStatus> {
    Command::new(program).arg(path).status().await
}
