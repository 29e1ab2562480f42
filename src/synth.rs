use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::engine::AudioHandle;
use crate::error::SynthesisError;
use crate::timing::{estimate_word_timings, word_count, WordTiming};

/// Audio plus the timing table that goes with it
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub audio: AudioHandle,
    pub word_timings: Vec<WordTiming>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub name: String,
    pub language: String,
    pub available: bool,
}

/// Request/response boundary to the text-to-speech side.
pub trait Synthesizer: Send + Sync {
    fn is_available(&self) -> bool;

    fn voices(&self) -> Vec<VoiceInfo>;

    /// Render `text` to audio at 1.0x and time every word in it.
    fn synthesize_full(&self, text: &str) -> Result<Synthesis, SynthesisError>;

    /// Time every word of `text` at `speed` without rendering audio.
    fn synthesize_timings(&self, text: &str, speed: f32) -> Result<Vec<WordTiming>, SynthesisError>;
}

/// Piper TTS driven as a subprocess
#[derive(Debug, Clone)]
pub struct PiperSynthesizer {
    binary: PathBuf,
    model: PathBuf,
    output: PathBuf,
}

impl PiperSynthesizer {
    pub fn new(binary: PathBuf, model: PathBuf, output: PathBuf) -> Self {
        Self {
            binary,
            model,
            output,
        }
    }

    /// Use the configured binary, falling back to `piper` on the PATH.
    pub fn locate(binary: Option<&Path>, model: PathBuf, output: PathBuf) -> Self {
        let binary = binary
            .map(Path::to_path_buf)
            .or_else(|| which::which("piper").ok())
            .unwrap_or_else(|| PathBuf::from("piper"));
        Self::new(binary, model, output)
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn render(&self, text: &str) -> Result<(), SynthesisError> {
        if let Some(parent) = self.output.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut child = Command::new(&self.binary)
            .arg("--model")
            .arg(&self.model)
            .arg("--output_file")
            .arg(&self.output)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SynthesisError::Failed(stderr.trim().to_string()));
        }
        Ok(())
    }
}

impl Synthesizer for PiperSynthesizer {
    fn is_available(&self) -> bool {
        self.binary.is_file() || which::which(&self.binary).is_ok()
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        let stem = self
            .model
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        // Piper voices are named <lang>_<REGION>-<name>-<quality>
        let language = stem
            .split('-')
            .next()
            .unwrap_or_default()
            .replace('_', "-");

        vec![VoiceInfo {
            name: stem,
            language,
            available: self.model.is_file(),
        }]
    }

    fn synthesize_full(&self, text: &str) -> Result<Synthesis, SynthesisError> {
        if word_count(text) == 0 {
            return Err(SynthesisError::EmptyText);
        }
        if !self.is_available() {
            return Err(SynthesisError::EngineNotInstalled(self.binary.clone()));
        }

        tracing::info!(
            binary = %self.binary.display(),
            words = word_count(text),
            "piper_synthesis_started"
        );
        self.render(text)?;

        let word_timings = estimate_word_timings(text, 1.0);
        let duration_ms = word_timings.last().map_or(0, |w| w.end_ms);
        Ok(Synthesis {
            audio: AudioHandle::file(&self.output),
            word_timings,
            duration_ms,
        })
    }

    fn synthesize_timings(&self, text: &str, speed: f32) -> Result<Vec<WordTiming>, SynthesisError> {
        if word_count(text) == 0 {
            return Err(SynthesisError::EmptyText);
        }
        Ok(estimate_word_timings(text, speed))
    }
}

/// Paces the text at the estimated speaking rate without producing audio.
#[derive(Debug, Clone, Copy, Default)]
pub struct PacedSynthesizer;

impl Synthesizer for PacedSynthesizer {
    fn is_available(&self) -> bool {
        true
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        vec![VoiceInfo {
            name: "paced (silent)".into(),
            language: String::new(),
            available: true,
        }]
    }

    fn synthesize_full(&self, text: &str) -> Result<Synthesis, SynthesisError> {
        let word_timings = self.synthesize_timings(text, 1.0)?;
        let duration_ms = word_timings.last().map_or(0, |w| w.end_ms);
        Ok(Synthesis {
            audio: AudioHandle::silent(),
            word_timings,
            duration_ms,
        })
    }

    fn synthesize_timings(&self, text: &str, speed: f32) -> Result<Vec<WordTiming>, SynthesisError> {
        if word_count(text) == 0 {
            return Err(SynthesisError::EmptyText);
        }
        Ok(estimate_word_timings(text, speed))
    }
}
