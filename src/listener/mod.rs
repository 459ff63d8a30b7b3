//! Voice trigger: fires the pipeline when the trigger phrase is spoken.
//!
//! ```text
//! AudioCapture ─▶ EchoGate ─▶ WindowedRecognizer ─▶ TriggerDetector ─▶ TriggerSink
//!                   ▲                                                     │
//!                   └──────────── BusyFlag ◀─── Orchestrator ◀────────────┘
//! ```

pub mod detector;
pub mod gate;
pub mod recognizer;
pub mod voice;

pub use detector::TriggerDetector;
pub use gate::EchoGate;
pub use recognizer::{
    Recognition, RecognizerError, SpeechRecognizer, WindowedRecognizer, SAMPLE_RATE,
};
pub use voice::{ListenerLoop, TriggerSink, VoiceListener};
