//! asc: fetch an OpenDev IRC channel's recent logs and turn them into a
//! readable chat, a summary and a spoken summary.

mod config;
mod error;
mod irclog;
mod message;
mod report;
mod service;
mod speech;
mod summarizer;
#[cfg(test)]
mod test_support;
mod transcript;

use clap::{CommandFactory, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use config::Config;
use service::{OutputType, ReportService, RunSettings};

#[derive(Parser, Debug)]
#[command(
    name = "asc",
    version,
    about = "Summarize recent OpenDev IRC meeting logs"
)]
struct Args {
    /// Enable verbose output (timestamps in the chat, debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config.yaml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Fetch meeting log from OpenDev IRC logs
    Fetch(FetchArgs),
    /// Show status information
    Status,
}

#[derive(clap::Args, Debug)]
struct FetchArgs {
    /// IRC channel name [config default: #openstack-ironic]
    channel: Option<String>,

    /// Nicknames to ignore when fetching messages
    #[arg(long, num_args = 0..)]
    ignore_nicks: Option<Vec<String>>,

    /// Timezone to use for calculating relative times
    #[arg(long)]
    timezone: Option<String>,

    /// Number of hours to look back for messages
    #[arg(long)]
    hours: Option<u32>,

    /// Also write the chat output to this file
    #[arg(long)]
    file: Option<PathBuf>,

    /// Type of output to generate
    #[arg(long, value_enum, default_value = "CHAT")]
    output_type: OutputType,

    /// Ollama model to use for generating summaries
    #[arg(long)]
    summary_model: Option<String>,

    /// Kokoro ONNX model to use for generating speech summaries
    #[arg(long)]
    tts_model: Option<String>,

    /// Directory to create the run's output directory in
    #[arg(long)]
    output_directory: Option<PathBuf>,

    /// Open generated HTML file in web browser
    #[arg(long)]
    open_browser: bool,
}

impl FetchArgs {
    /// Layer the flags over the loaded config.
    fn into_settings(self, config: Config, verbose: bool) -> RunSettings {
        let Config {
            mut fetch,
            mut ollama,
            mut tts,
            mut output,
        } = config;

        if let Some(channel) = self.channel {
            fetch.channel = channel;
        }
        if let Some(ignore_nicks) = self.ignore_nicks {
            fetch.ignore_nicks = ignore_nicks;
        }
        if let Some(timezone) = self.timezone {
            fetch.timezone = timezone;
        }
        if let Some(hours) = self.hours {
            fetch.hours = hours;
        }
        if let Some(model) = self.summary_model {
            ollama.model = model;
        }
        if let Some(model_path) = self.tts_model {
            tts.model_path = model_path;
        }
        if let Some(directory) = self.output_directory {
            output.directory = directory;
        }
        output.open_browser |= self.open_browser;

        RunSettings {
            fetch,
            ollama,
            tts,
            output,
            output_type: self.output_type,
            verbose,
            chat_file: self.file,
        }
    }
}

fn cmd_status(verbose: bool, out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "ASC Status: Running")?;
    if verbose {
        writeln!(out, "Version: {}", env!("CARGO_PKG_VERSION"))?;
        writeln!(out, "All systems operational.")?;
    }
    Ok(())
}

/// Run the parsed command and return the process exit code.
async fn dispatch(args: Args, out: &mut impl Write) -> Result<u8, Box<dyn std::error::Error>> {
    let Some(command) = args.command else {
        write!(out, "{}", Args::command().render_help())?;
        return Ok(1);
    };

    match command {
        Cmd::Fetch(fetch_args) => {
            let config = Config::load(args.config.as_deref());
            let settings = fetch_args.into_settings(config, args.verbose);
            let outcome = ReportService::new(settings).run().await?;
            info!(
                "Done: {} messages, output in {}",
                outcome.message_count,
                outcome.paths.dir.display()
            );
        }
        Cmd::Status => cmd_status(args.verbose, out)?,
    }

    Ok(0)
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging on stderr; stdout carries the chat and summary
    let filter = if args.verbose {
        EnvFilter::new("debug,ort=info,html5ever=info,selectors=info")
    } else {
        EnvFilter::new("info,ort=warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!("args: {args:?}");

    let code = dispatch(args, &mut std::io::stdout()).await?;
    Ok(ExitCode::from(code))
}
