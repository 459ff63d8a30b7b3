//! Vision engine trait and the OpenAI-compatible implementation.
//!
//! A [`VisionEngine`] runs only inside the worker process.  It is blocking by
//! contract: one `describe` call may hold the accelerator for many seconds.
//!
//! [`ApiVisionEngine`] sends the frame as a JPEG data URI to any
//! `/v1/chat/completions` endpoint that accepts image content (vLLM, llama.cpp
//! server, a local Hailo bridge, ...).  All connection details come from
//! [`InferenceConfig`].

use std::io::Cursor;
use std::time::Duration;

use base64::Engine as _;
use image::{ImageFormat, RgbImage};
use thiserror::Error;

use crate::camera::DecodedFrame;
use crate::config::InferenceConfig;

/// Returned when the model produces only whitespace.
pub const FALLBACK_DESCRIPTION: &str = "Could not describe image.";

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine could not attach to its device or endpoint.
    #[error("device unavailable: {0}")]
    Device(String),

    /// The engine is up but this request failed.
    #[error("{0}")]
    Failed(String),
}

// ---------------------------------------------------------------------------
// VisionEngine trait
// ---------------------------------------------------------------------------

pub trait VisionEngine: Send {
    fn describe(&mut self, frame: &DecodedFrame) -> Result<String, EngineError>;
}

// ---------------------------------------------------------------------------
// ApiVisionEngine
// ---------------------------------------------------------------------------

pub struct ApiVisionEngine {
    client: reqwest::blocking::Client,
    config: InferenceConfig,
}

impl ApiVisionEngine {
    /// Build the client and check that the endpoint answers.  Any failure
    /// here is a device error: the worker reports it as `InitFailed`.
    pub fn connect(config: &InferenceConfig) -> Result<Self, EngineError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| EngineError::Device(e.to_string()))?;

        let engine = Self {
            client,
            config: config.clone(),
        };
        engine.probe()?;
        log::info!(
            "inference: connected to {} (model {})",
            engine.config.base_url,
            engine.config.model
        );
        Ok(engine)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn authorized(
        &self,
        req: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match self.config.api_key.as_deref() {
            Some(key) if !key.is_empty() => req.bearer_auth(key),
            _ => req,
        }
    }

    fn probe(&self) -> Result<(), EngineError> {
        let req = self.client.get(self.url("/v1/models")).timeout(PROBE_TIMEOUT);
        let resp = self
            .authorized(req)
            .send()
            .map_err(|e| EngineError::Device(format!("{}: {e}", self.config.base_url)))?;
        if !resp.status().is_success() {
            return Err(EngineError::Device(format!(
                "{} answered {}",
                self.config.base_url,
                resp.status()
            )));
        }
        Ok(())
    }
}

impl VisionEngine for ApiVisionEngine {
    fn describe(&mut self, frame: &DecodedFrame) -> Result<String, EngineError> {
        let data_uri = jpeg_data_uri(frame)?;

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "image_url", "image_url": { "url": data_uri } },
                    { "type": "text", "text": self.config.prompt }
                ]
            }],
            "stream": false,
            "max_tokens": self.config.max_tokens
        });

        let req = self.client.post(self.url("/v1/chat/completions")).json(&body);
        let resp = self.authorized(req).send().map_err(|e| {
            if e.is_connect() {
                EngineError::Device(e.to_string())
            } else {
                EngineError::Failed(format!("request failed: {e}"))
            }
        })?;

        let status = resp.status();
        let json: serde_json::Value = resp
            .json()
            .map_err(|e| EngineError::Failed(format!("bad response: {e}")))?;
        if !status.is_success() {
            return Err(EngineError::Failed(format!("endpoint answered {status}: {json}")));
        }

        Ok(description_from(&json))
    }
}

fn description_from(json: &serde_json::Value) -> String {
    let text = json["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or("")
        .trim();
    if text.is_empty() {
        FALLBACK_DESCRIPTION.to_string()
    } else {
        text.to_string()
    }
}

fn jpeg_data_uri(frame: &DecodedFrame) -> Result<String, EngineError> {
    let img = RgbImage::from_raw(frame.width, frame.height, frame.pixels.to_vec())
        .ok_or_else(|| EngineError::Failed("frame buffer does not match its size".into()))?;
    let mut jpeg = Cursor::new(Vec::new());
    img.write_to(&mut jpeg, ImageFormat::Jpeg)
        .map_err(|e| EngineError::Failed(format!("jpeg encode: {e}")))?;
    Ok(format!(
        "data:image/jpeg;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(jpeg.into_inner())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_is_trimmed() {
        let json = serde_json::json!({
            "choices": [{ "message": { "content": "  A cat on a sofa.\n" } }]
        });
        assert_eq!(description_from(&json), "A cat on a sofa.");
    }

    #[test]
    fn empty_content_falls_back() {
        let json = serde_json::json!({ "choices": [{ "message": { "content": "   " } }] });
        assert_eq!(description_from(&json), FALLBACK_DESCRIPTION);
        assert_eq!(description_from(&serde_json::json!({})), FALLBACK_DESCRIPTION);
    }

    #[test]
    fn frame_becomes_jpeg_data_uri() {
        let frame = DecodedFrame::new(4, 4, vec![90; 4 * 4 * 3]).unwrap();
        let uri = jpeg_data_uri(&frame).unwrap();
        let b64 = uri.strip_prefix("data:image/jpeg;base64,").unwrap();
        let bytes = base64::engine::general_purpose::STANDARD.decode(b64).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn unreachable_endpoint_is_a_device_error() {
        let config = InferenceConfig {
            base_url: "http://127.0.0.1:9".into(),
            ..InferenceConfig::default()
        };
        assert!(matches!(
            ApiVisionEngine::connect(&config),
            Err(EngineError::Device(_))
        ));
    }
}
