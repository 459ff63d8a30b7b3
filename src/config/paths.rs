//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Linux:   ~/.config/narrate/
//!   macOS:   ~/Library/Application Support/narrate/
//!
//! Data dir (STT model, Piper voice):
//!   Linux:   ~/.local/share/narrate/models/
//!   macOS:   ~/Library/Application Support/narrate/models/

use std::path::{Path, PathBuf};

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory for the GGML recognizer model and the Piper voice.
    pub models_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "narrate";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let models_dir = data_dir.join("models");

        Self {
            config_dir,
            settings_file,
            models_dir,
        }
    }

    /// Paths rooted at an explicit settings file; models stay in the
    /// platform data dir.
    pub fn with_settings_file(settings_file: impl AsRef<Path>) -> Self {
        let settings_file = settings_file.as_ref().to_path_buf();
        let config_dir = settings_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            config_dir,
            settings_file,
            ..Self::new()
        }
    }

    /// Path of the GGML model used by the voice listener.
    pub fn stt_model(&self, stem: &str) -> PathBuf {
        self.models_dir.join(format!("{stem}.bin"))
    }

    /// Default Piper voice when none is configured.
    pub fn default_voice(&self) -> PathBuf {
        self.models_dir.join("en_US-lessac-medium.onnx")
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
