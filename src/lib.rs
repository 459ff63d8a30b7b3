//! Narrate: point a camera, say "capture image", hear what it sees.
//!
//! A single-device narration service.  A manual button or a spoken trigger
//! phrase starts a run that snapshots the live camera frame, has a vision
//! model describe it in an isolated worker process, and speaks the
//! description.  Every step is streamed to browser clients.
//!
//! | Module      | Role                                                  |
//! |-------------|-------------------------------------------------------|
//! | `pipeline`  | orchestrator, single-flight lock, phases, errors      |
//! | `events`    | fan-out of pipeline events to SSE subscribers         |
//! | `camera`    | camera reader process and latest-frame store          |
//! | `inference` | vision worker process and its timeout boundary        |
//! | `speech`    | text-to-speech and the acknowledgment beep            |
//! | `playback`  | one interruptible audio player process                |
//! | `listener`  | always-on voice trigger                               |
//! | `audio`     | microphone capture, resampling, VAD                   |
//! | `stt`       | Whisper speech-to-text for the listener               |
//! | `server`    | axum routes for the UI                                |
//! | `config`    | TOML settings and platform paths                      |

pub mod audio;
pub mod camera;
pub mod config;
pub mod events;
pub mod inference;
pub mod listener;
pub mod pipeline;
pub mod playback;
pub mod server;
pub mod speech;
pub mod stt;
