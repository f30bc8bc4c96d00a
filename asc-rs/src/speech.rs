//! Kokoro TTS engine: summary → phonemes → ONNX inference → WAV file.
//!
//! Pipeline:
//! 1. Summary → speakable text (drop reasoning, markdown symbols)
//! 2. Text → sentences (split on .!?)
//! 3. Sentence → phonemes (misaki-rs G2P)
//! 4. Phonemes → token IDs (tokenizer.json vocabulary)
//! 5. Token IDs + voice style + speed → ONNX inference → f32 audio (24kHz)
//! 6. Audio → 16-bit mono WAV (hound)

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use ndarray::{Array2, Array3};
use ndarray_npy::NpzReader;
use ort::value::Tensor;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::TtsConfig;
use crate::error::{Error, Result};

pub const SAMPLE_RATE: u32 = 24000;
const MAX_TOKENS: usize = 510; // Voice style array first dimension

/// Silence inserted between sentences.
const SENTENCE_GAP_SECS: f32 = 0.2;

/// Loaded voice style data: shape (510, 1, 256) f32.
struct VoiceData {
    /// Style vectors indexed by token count. shape: (510, 256)
    styles: Array2<f32>,
}

/// Native Kokoro TTS engine.
pub struct KokoroTtsEngine {
    session: Option<ort::session::Session>,
    phonemizer: Option<misaki_rs::G2P>,

    // Tokenizer vocabulary: char → token ID
    vocab: HashMap<char, i64>,

    // Voices: name → style data
    voices: HashMap<String, VoiceData>,

    voice: String,
    speed: f32,

    model_path: PathBuf,
    voices_path: PathBuf,
    tokenizer_path: PathBuf,
}

impl KokoroTtsEngine {
    pub fn new(config: &TtsConfig) -> Self {
        let base_dir = std::env::current_dir().unwrap_or_default();
        let or_default = |configured: &str, file: &str| {
            if configured.is_empty() {
                base_dir.join(file)
            } else {
                PathBuf::from(configured)
            }
        };

        Self {
            session: None,
            phonemizer: None,
            vocab: HashMap::new(),
            voices: HashMap::new(),
            voice: config.voice.clone(),
            speed: config.speed,
            model_path: or_default(&config.model_path, "kokoro-v1.0.onnx"),
            voices_path: or_default(&config.voices_path, "voices-v1.0.bin"),
            tokenizer_path: or_default(&config.tokenizer_path, "tokenizer.json"),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    /// Load the ONNX model, tokenizer, voices, and phonemizer.
    pub fn load(&mut self) -> Result<()> {
        let t0 = Instant::now();

        info!("Loading tokenizer from {}", self.tokenizer_path.display());
        self.vocab = load_tokenizer(&self.tokenizer_path)?;
        info!("Tokenizer loaded: {} tokens", self.vocab.len());

        info!("Loading voices from {}", self.voices_path.display());
        self.voices = load_voices(&self.voices_path)?;
        info!("Loaded {} voices", self.voices.len());
        if !self.voices.contains_key(&self.voice) {
            let mut names: Vec<&String> = self.voices.keys().collect();
            names.sort();
            return Err(Error::Speech(format!(
                "Voice '{}' not found, available: {names:?}",
                self.voice
            )));
        }

        info!("Loading ONNX model from {}", self.model_path.display());
        let session = ort::session::Session::builder()
            .map_err(|e| Error::Speech(format!("Failed to create ONNX session builder: {e}")))?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(|e| Error::Speech(format!("Failed to set optimization level: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| Error::Speech(format!("Failed to set thread count: {e}")))?
            .commit_from_file(&self.model_path)
            .map_err(|e| Error::Speech(format!("Failed to load ONNX model: {e}")))?;
        self.session = Some(session);

        info!("Initializing misaki-rs phonemizer...");
        self.phonemizer = Some(misaki_rs::G2P::new(misaki_rs::Language::EnglishUS));

        info!("Kokoro TTS loaded in {}ms", t0.elapsed().as_millis());
        Ok(())
    }

    /// Synthesize `text` sentence by sentence into one sample buffer.
    ///
    /// A sentence that fails to synthesize is skipped with a warning; the
    /// call only fails if nothing at all could be produced.
    pub fn synthesize(&mut self, text: &str) -> Result<Vec<f32>> {
        if !self.is_loaded() {
            return Err(Error::Speech("Model not loaded".into()));
        }
        let sentences = split_sentences(text.trim());
        let gap = vec![0.0_f32; (SAMPLE_RATE as f32 * SENTENCE_GAP_SECS) as usize];

        let t0 = Instant::now();
        let mut audio = Vec::new();
        let mut failures = 0;
        for (i, sentence) in sentences.iter().enumerate() {
            match self.generate_audio(sentence) {
                Ok(samples) if samples.is_empty() => {}
                Ok(samples) => {
                    if !audio.is_empty() {
                        audio.extend_from_slice(&gap);
                    }
                    audio.extend(samples);
                }
                Err(e) => {
                    failures += 1;
                    warn!("TTS generation failed for sentence {}/{}: {e}", i + 1, sentences.len());
                }
            }
        }

        if audio.is_empty() && failures > 0 {
            return Err(Error::Speech(format!("all {failures} sentences failed to synthesize")));
        }

        info!(
            "Synthesized {} sentences ({:.1}s audio) in {}ms",
            sentences.len(),
            audio.len() as f32 / SAMPLE_RATE as f32,
            t0.elapsed().as_millis()
        );
        Ok(audio)
    }

    /// Generate audio samples for a single sentence.
    fn generate_audio(&mut self, text: &str) -> Result<Vec<f32>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| Error::Speech("Model not loaded".into()))?;
        let phonemizer = self
            .phonemizer
            .as_ref()
            .ok_or_else(|| Error::Speech("Phonemizer not loaded".into()))?;

        // 1. Text → phonemes via misaki-rs G2P
        let (phonemes, _tokens) = phonemizer
            .g2p(text)
            .map_err(|e| Error::Speech(format!("Phonemization failed: {e}")))?;

        if phonemes.is_empty() {
            return Ok(Vec::new());
        }

        // 2. Phonemes → token IDs, unknown characters dropped
        let mut token_ids: Vec<i64> = Vec::with_capacity(phonemes.len() + 2);
        token_ids.push(0);
        token_ids.extend(phonemes.chars().filter_map(|ch| self.vocab.get(&ch).copied()));
        token_ids.push(0);

        let n_tokens = token_ids.len().min(MAX_TOKENS);
        token_ids.truncate(n_tokens);

        // 3. Voice style vector for this token count
        let voice_data = self
            .voices
            .get(&self.voice)
            .ok_or_else(|| Error::Speech(format!("Voice not found: {}", self.voice)))?;
        let style_idx = (n_tokens.saturating_sub(2)).min(voice_data.styles.nrows().saturating_sub(1));
        let style_vec: Vec<f32> = voice_data.styles.row(style_idx).to_vec();

        // 4. ONNX input tensors
        let tokens_array = Array2::from_shape_vec((1, n_tokens), token_ids)
            .map_err(|e| Error::Speech(format!("Failed to create tokens tensor: {e}")))?;
        let tokens_tensor = Tensor::from_array(tokens_array)
            .map_err(|e| Error::Speech(format!("Failed to create tokens ort tensor: {e}")))?;

        let style_array = Array2::from_shape_vec((1, 256), style_vec)
            .map_err(|e| Error::Speech(format!("Failed to create style tensor: {e}")))?;
        let style_tensor = Tensor::from_array(style_array)
            .map_err(|e| Error::Speech(format!("Failed to create style ort tensor: {e}")))?;

        let speed_array = ndarray::Array1::from_vec(vec![self.speed]);
        let speed_tensor = Tensor::from_array(speed_array)
            .map_err(|e| Error::Speech(format!("Failed to create speed ort tensor: {e}")))?;

        // 5. Inference
        let outputs = session
            .run(ort::inputs![
                "tokens" => tokens_tensor,
                "style" => style_tensor,
                "speed" => speed_tensor
            ])
            .map_err(|e| Error::Speech(format!("ONNX inference failed: {e}")))?;

        // 6. First output is the waveform
        let first_output = outputs
            .iter()
            .next()
            .ok_or_else(|| Error::Speech("No output tensor from model".into()))?;

        let (_shape, audio_slice) = first_output
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::Speech(format!("Failed to extract audio tensor: {e}")))?;

        let samples: Vec<f32> = audio_slice.to_vec();
        debug!(
            "Generated {} samples ({:.1}s)",
            samples.len(),
            samples.len() as f32 / SAMPLE_RATE as f32
        );

        Ok(samples)
    }
}

/// Write mono f32 samples in [-1, 1] as a 16-bit PCM WAV file.
pub fn write_wav(path: &Path, samples: &[f32]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let wav_err = |e: hound::Error| Error::Speech(format!("Failed to write {}: {e}", path.display()));
    let mut writer = hound::WavWriter::create(path, spec).map_err(wav_err)?;
    for &sample in samples {
        let s = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        writer.write_sample(s).map_err(wav_err)?;
    }
    writer.finalize().map_err(wav_err)?;

    info!("Saved WAV to {}", path.display());
    Ok(())
}

/// Turn a model summary into text a voice can read.
///
/// Keeps only the answer after the last `</think>`, turns a leading `* `
/// bullet into `- `, drops `*` and `#`, and replaces punctuation followed by
/// a space (other than commas) with a full stop.
pub fn prepare_speech_text(summary: &str) -> Result<String> {
    let answer = summary.rsplit("</think>").next().unwrap_or(summary);

    let answer = match answer.strip_prefix("* ") {
        Some(rest) => format!("- {rest}"),
        None => answer.to_string(),
    };
    let answer = answer.replace(['*', '#'], "");

    let punctuation = Regex::new(r"[^\w\s,] ").map_err(|e| Error::Speech(e.to_string()))?;
    Ok(punctuation.replace_all(&answer, ". ").into_owned())
}

#[derive(Deserialize)]
struct TokenizerFile {
    model: TokenizerModel,
}

#[derive(Deserialize)]
struct TokenizerModel {
    vocab: HashMap<String, i64>,
}

/// Phoneme vocabulary from `tokenizer.json`. Every Kokoro token is a single
/// character; anything longer is keyed by its first one.
fn load_tokenizer(path: &Path) -> Result<HashMap<char, i64>> {
    let contents = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let file: TokenizerFile = serde_json::from_str(&contents)
        .map_err(|e| Error::Speech(format!("Bad tokenizer {}: {e}", path.display())))?;

    Ok(file
        .model
        .vocab
        .into_iter()
        .filter_map(|(token, id)| token.chars().next().map(|ch| (ch, id)))
        .collect())
}

/// Voice style tables from the NPZ archive, keyed by voice name.
fn load_voices(path: &Path) -> Result<HashMap<String, VoiceData>> {
    let npz_err = |what: String| move |e: ndarray_npy::ReadNpzError| Error::Speech(format!("{what}: {e}"));

    let file = fs::File::open(path).map_err(|e| Error::io(path, e))?;
    let mut npz = NpzReader::new(file).map_err(npz_err(format!("Bad voices file {}", path.display())))?;
    let entries = npz.names().map_err(npz_err("Cannot list voices".into()))?;

    let mut voices = HashMap::with_capacity(entries.len());
    for entry in entries {
        let name = entry.trim_end_matches(".npy").to_string();
        let table: Array3<f32> = npz
            .by_name(&entry)
            .map_err(npz_err(format!("Cannot read voice '{name}'")))?;

        let styles = style_rows(&name, table)?;
        voices.insert(name, VoiceData { styles });
    }

    Ok(voices)
}

/// Flatten a voice's (rows, 1, 256) style table to (rows, 256).
fn style_rows(name: &str, table: Array3<f32>) -> Result<Array2<f32>> {
    let (rows, _, width) = table.dim();
    if rows == 0 {
        return Err(Error::Speech(format!("Voice '{name}' has no style rows")));
    }
    table
        .into_shape_with_order((rows, width))
        .map_err(|e| Error::Speech(format!("Voice '{name}' has an unexpected shape: {e}")))
}

/// Sentences end at `.`, `!` or `?` followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut rest = text;

    while let Some(end) = rest
        .char_indices()
        .zip(rest.chars().skip(1))
        .find(|((_, c), next)| matches!(c, '.' | '!' | '?') && next.is_whitespace())
        .map(|((i, _), _)| i + 1)
    {
        let sentence = rest[..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        rest = &rest[end..];
    }

    let tail = rest.trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_rows_flattens_table() {
        let table = Array3::<f32>::zeros((510, 1, 256));
        let styles = style_rows("bf_emma", table).unwrap();
        assert_eq!(styles.dim(), (510, 256));
    }

    #[test]
    fn test_style_rows_rejects_empty_table() {
        let table = Array3::<f32>::zeros((0, 1, 256));
        let err = style_rows("bf_empty", table).unwrap_err();
        assert!(matches!(err, Error::Speech(msg) if msg.contains("bf_empty")));
    }

    #[test]
    fn test_prepare_drops_thinking_and_markdown() {
        let text = prepare_speech_text("<think>plan</think>\n## Summary\n**Bold** point").unwrap();
        assert_eq!(text, "\n Summary\nBold point");
    }

    #[test]
    fn test_prepare_leading_bullet_and_punctuation() {
        let text = prepare_speech_text("* first: one; two, three").unwrap();
        // "- " itself is punctuation followed by a space
        assert_eq!(text, ". first. one. two, three");
    }

    #[test]
    fn test_prepare_keeps_plain_sentences() {
        let text = prepare_speech_text("They fixed the bug. Tests pass").unwrap();
        assert_eq!(text, "They fixed the bug. Tests pass");
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("One. Two! Three? v1.2 is out"),
            vec!["One.", "Two!", "Three?", "v1.2 is out"]
        );
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn test_write_wav_round_trips_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.wav");
        write_wav(&path, &[0.0, 0.5, -0.5, 1.5]).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, SAMPLE_RATE);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 16383, -16383, 32767]);
    }

    #[test]
    fn test_engine_paths_default_to_working_dir() {
        let engine = KokoroTtsEngine::new(&TtsConfig::default());
        assert!(!engine.is_loaded());
        assert!(engine.model_path.ends_with("kokoro-v1.0.onnx"));
        assert!(engine.voices_path.ends_with("voices-v1.0.bin"));
        assert!(engine.tokenizer_path.ends_with("tokenizer.json"));
    }

    #[test]
    fn test_load_fails_on_missing_tokenizer() {
        let dir = tempfile::tempdir().unwrap();
        let config = TtsConfig {
            tokenizer_path: dir.path().join("missing.json").display().to_string(),
            ..TtsConfig::default()
        };
        let mut engine = KokoroTtsEngine::new(&config);
        assert!(matches!(engine.load(), Err(Error::Io { .. })));
    }

    #[test]
    fn test_synthesize_without_model_fails() {
        let mut engine = KokoroTtsEngine::new(&TtsConfig::default());
        assert!(matches!(engine.synthesize("Hello there."), Err(Error::Speech(_))));
    }
}
