//! Wire format between the orchestrator and the inference worker.
//!
//! One JSON object per line over the worker's stdin (requests) and stdout
//! (replies).  The worker writes exactly one of `ready` / `init_failed`
//! first, then one reply per request.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::camera::DecodedFrame;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    Describe {
        id: u64,
        width: u32,
        height: u32,
        /// Base64 of the packed RGB8 pixels.
        pixels: String,
    },
}

impl WorkerRequest {
    pub fn describe(id: u64, frame: &DecodedFrame) -> Self {
        WorkerRequest::Describe {
            id,
            width: frame.width,
            height: frame.height,
            pixels: base64::engine::general_purpose::STANDARD.encode(&frame.pixels),
        }
    }
}

/// Which side of the engine failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Device,
    Engine,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerReply {
    Ready,
    InitFailed {
        message: String,
    },
    Described {
        id: u64,
        text: String,
    },
    Failed {
        id: u64,
        kind: FailureKind,
        message: String,
    },
}

/// Rebuild the frame carried by a describe request.
pub fn decode_frame(width: u32, height: u32, pixels: &str) -> Result<DecodedFrame, String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(pixels)
        .map_err(|e| format!("pixels are not base64: {e}"))?;
    DecodedFrame::new(width, height, bytes).map_err(|e| e.to_string())
}
