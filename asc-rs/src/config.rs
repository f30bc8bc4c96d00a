//! Configuration management for asc.
//!
//! Loads config from YAML files in standard locations. Every section has
//! defaults, so a missing file or section is never an error; CLI flags are
//! applied on top by the caller.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_LOG_BASE_URL: &str = "https://meetings.opendev.org/irclogs";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub channel: String,
    pub ignore_nicks: Vec<String>,
    /// IANA name used to interpret the local wall clock when computing
    /// the look-back cutoff.
    pub timezone: String,
    pub hours: u32,
    pub base_url: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            channel: "#openstack-ironic".into(),
            ignore_nicks: vec!["opendevreview".into()],
            timezone: "Pacific/Auckland".into(),
            hours: 14,
            base_url: DEFAULT_LOG_BASE_URL.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub model: String,
    pub host: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            model: "hf.co/mradermacher/Josiefied-DeepSeek-R1-0528-Qwen3-8B-abliterated-v1-i1-GGUF:Q4_K_M"
                .into(),
            host: "http://localhost:11434".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub model_path: String,
    pub voices_path: String,
    pub tokenizer_path: String,
    pub voice: String,
    pub speed: f32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            voices_path: String::new(),
            tokenizer_path: String::new(),
            voice: "bf_emma".into(),
            speed: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub open_browser: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            open_browser: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fetch: FetchConfig,
    pub ollama: OllamaConfig,
    pub tts: TtsConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/asc/config.yaml
    /// 3. /etc/asc/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/asc/config.yaml")),
                Some(PathBuf::from("/etc/asc/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match Self::from_yaml(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(contents)
    }
}
