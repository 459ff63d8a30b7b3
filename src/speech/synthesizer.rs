//! Text-to-speech collaborator.
//!
//! [`SpeechSynthesizer`] is blocking; the pipeline calls it through
//! `tokio::task::spawn_blocking`.  [`PiperSynthesizer`] runs the Piper CLI
//! once per utterance and collects the WAV it writes to stdout.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;

use crate::config::{AppPaths, SpeechConfig};

#[derive(Debug, Clone, Error)]
pub enum SpeechError {
    #[error("nothing to say")]
    EmptyText,

    #[error("voice model not found: {0}")]
    ModelNotFound(String),

    #[error("synthesizer failed: {0}")]
    Failed(String),
}

/// Turns text into WAV bytes.
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError>;
}

// ---------------------------------------------------------------------------
// PiperSynthesizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PiperSynthesizer {
    program: String,
    model: PathBuf,
}

impl PiperSynthesizer {
    /// `model` gets an `.onnx` extension appended when it has none.
    pub fn new(program: impl Into<String>, model: impl AsRef<Path>) -> Self {
        Self {
            program: program.into(),
            model: onnx_path(model.as_ref()),
        }
    }

    pub fn from_config(config: &SpeechConfig, paths: &AppPaths) -> Self {
        let model = config
            .model
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| paths.default_voice());
        Self::new(config.program.clone(), model)
    }

    pub fn model(&self) -> &Path {
        &self.model
    }
}

fn onnx_path(model: &Path) -> PathBuf {
    if model.extension().is_some_and(|e| e == "onnx") {
        model.to_path_buf()
    } else {
        let mut s = model.as_os_str().to_owned();
        s.push(".onnx");
        PathBuf::from(s)
    }
}

impl SpeechSynthesizer for PiperSynthesizer {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SpeechError::EmptyText);
        }
        if !self.model.exists() {
            return Err(SpeechError::ModelNotFound(self.model.display().to_string()));
        }

        let mut child = Command::new(&self.program)
            .arg("--model")
            .arg(&self.model)
            .args(["--output_file", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SpeechError::Failed(format!("{}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .and_then(|_| stdin.write_all(b"\n"))
                .map_err(|e| SpeechError::Failed(format!("writing text: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| SpeechError::Failed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SpeechError::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(SpeechError::Failed("synthesizer produced no audio".into()));
        }

        log::debug!("speech: {} chars -> {} bytes", text.len(), output.stdout.len());
        Ok(output.stdout)
    }
}
