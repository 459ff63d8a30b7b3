//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Every section is `#[serde(default)]`, so a `settings.toml` only needs the
//! keys it wants to override.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// HTTP / event-stream settings for the UI boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to.
    pub bind_addr: String,
    /// Seconds of silence on an event stream before a keep-alive marker is
    /// sent to that subscriber.
    pub keep_alive_secs: u64,
    /// Capacity of each subscriber's event queue.  A subscriber whose queue
    /// fills is dropped.
    pub subscriber_capacity: usize,
    /// Number of log entries kept in the in-memory rolling log.
    pub log_history: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".into(),
            keep_alive_secs: 15,
            subscriber_capacity: 200,
            log_history: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// CameraConfig
// ---------------------------------------------------------------------------

/// Settings for the MJPEG camera process that feeds the frame store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Start the camera reader at all.
    pub enabled: bool,
    /// Camera program; must write an MJPEG stream to stdout.
    pub program: String,
    /// Requested frame width in pixels.
    pub width: u32,
    /// Requested frame height in pixels.
    pub height: u32,
    /// How long the video feed shows the captured frame after a trigger.
    pub freeze_secs: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "rpicam-vid".into(),
            width: 640,
            height: 480,
            freeze_secs: 3.0,
        }
    }
}

impl CameraConfig {
    pub fn freeze(&self) -> Duration {
        seconds(
            self.freeze_secs,
            Self::default().freeze_secs,
            "camera.freeze_secs",
        )
    }
}

// ---------------------------------------------------------------------------
// InferenceConfig
// ---------------------------------------------------------------------------

/// Settings for the vision-inference worker and the pipeline lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// How long a manual trigger waits for a running pipeline to finish
    /// before it is rejected as busy.
    pub lock_timeout_secs: u64,
    /// How long the pipeline waits for one inference before abandoning the
    /// worker.
    pub timeout_secs: u64,
    /// How long a freshly started worker may take to attach to the device.
    pub startup_timeout_secs: u64,
    /// Base URL of the OpenAI-compatible vision endpoint.
    pub base_url: String,
    /// Model identifier sent to the endpoint.
    pub model: String,
    /// API key; `None` for local endpoints.
    pub api_key: Option<String>,
    /// Instruction sent alongside every frame.
    pub prompt: String,
    /// Upper bound on generated tokens per description.
    pub max_tokens: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            lock_timeout_secs: 30,
            timeout_secs: 60,
            startup_timeout_secs: 30,
            base_url: "http://localhost:8000".into(),
            model: "qwen2-vl-2b-instruct".into(),
            api_key: None,
            prompt: "Describe this image in one or two sentences for someone who cannot see it."
                .into(),
            max_tokens: 150,
        }
    }
}

impl InferenceConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// SpeechConfig
// ---------------------------------------------------------------------------

/// Settings for the Piper speech synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Synthesizer program.
    pub program: String,
    /// Voice model path; `.onnx` is appended when missing.  `None` resolves
    /// to `<models_dir>/en_US-lessac-medium.onnx`.
    pub model: Option<String>,
    /// Play a short beep as soon as a trigger is accepted.
    pub ack_beep: bool,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            program: "piper".into(),
            model: None,
            ack_beep: true,
        }
    }
}

// ---------------------------------------------------------------------------
// PlaybackConfig
// ---------------------------------------------------------------------------

/// Settings for the external audio player.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Player program; reads a WAV stream from stdin.
    pub program: String,
    /// ALSA output device.
    pub device: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            program: "aplay".into(),
            device: "plughw:2,0".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ListenerConfig
// ---------------------------------------------------------------------------

/// Settings for the always-on voice trigger listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Start the listener at all.
    pub enabled: bool,
    /// Phrase that fires the pipeline when it appears anywhere in a partial
    /// or final transcript.
    pub trigger_phrase: String,
    /// Minimum seconds between two fires.
    pub cooldown_secs: f32,
    /// GGML model file stem inside the models directory.
    pub model: String,
    /// ISO-639-1 language code, or `"auto"`.
    pub language: String,
    /// Substring of the preferred input device name; `None` uses the system
    /// default microphone.
    pub input_device: Option<String>,
    /// RMS level above which a frame counts as speech.
    pub vad_threshold: f32,
    /// Seconds of new audio between two partial transcripts.
    pub partial_interval_secs: f32,
    /// Seconds of trailing silence that finalise an utterance.
    pub silence_secs: f32,
    /// Longest utterance kept in the recognition window.
    pub max_utterance_secs: f32,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger_phrase: "capture image".into(),
            cooldown_secs: 3.0,
            model: "ggml-base.en".into(),
            language: "en".into(),
            input_device: Some("EMEET".into()),
            vad_threshold: 0.01,
            partial_interval_secs: 1.0,
            silence_secs: 0.6,
            max_utterance_secs: 8.0,
        }
    }
}

impl ListenerConfig {
    pub fn cooldown(&self) -> Duration {
        seconds(
            self.cooldown_secs,
            Self::default().cooldown_secs,
            "listener.cooldown_secs",
        )
    }
}

/// Negative values clamp to zero; infinite or overflowing ones fall back to
/// `fallback` with a warning.
fn seconds(value: f32, fallback: f32, key: &str) -> Duration {
    Duration::try_from_secs_f32(value.max(0.0)).unwrap_or_else(|_| {
        log::warn!("config: {key} = {value} is not a usable duration, using {fallback}");
        Duration::from_secs_f32(fallback)
    })
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use narrate::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server and event stream settings.
    pub server: ServerConfig,
    /// Camera reader settings.
    pub camera: CameraConfig,
    /// Inference worker and pipeline timing.
    pub inference: InferenceConfig,
    /// Speech synthesis settings.
    pub speech: SpeechConfig,
    /// Audio output settings.
    pub playback: PlaybackConfig,
    /// Voice trigger settings.
    pub listener: ListenerConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply the `PIPER_MODEL` and `ALSA_DEVICE` environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var("PIPER_MODEL").ok(),
            std::env::var("ALSA_DEVICE").ok(),
        )
    }

    fn with_overrides(mut self, piper_model: Option<String>, alsa_device: Option<String>) -> Self {
        if let Some(model) = piper_model.filter(|m| !m.is_empty()) {
            self.speech.model = Some(model);
        }
        if let Some(device) = alsa_device.filter(|d| !d.is_empty()) {
            self.playback.device = device;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
