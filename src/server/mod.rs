//! HTTP boundary: the browser UI, its control endpoints and live streams.
//!
//! | Route             | Method | Purpose                                   |
//! |-------------------|--------|-------------------------------------------|
//! | `/`               | GET    | single-page UI                            |
//! | `/events`         | GET    | server-sent hub events                    |
//! | `/video_feed`     | GET    | MJPEG stream of the frame store           |
//! | `/api/trigger`    | POST   | start a run (`202` / `409`)               |
//! | `/api/stop`       | POST   | stop speech output, always `200`          |
//! | `/api/speak`      | POST   | speak a given text (`202` / `409` / `400`)|
//! | `/api/status`     | GET    | current phase and health                  |
//! | `/api/log`        | GET    | rolling log                               |

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::camera::FrameStore;
use crate::events::EventHub;
use crate::pipeline::Orchestrator;

pub mod api;
pub mod stream;

/// Shared by every handler.
#[derive(Clone)]
pub struct ServerState {
    pub orchestrator: Orchestrator,
    pub hub: EventHub,
    pub frames: Arc<FrameStore>,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(api::index))
        .route("/events", get(stream::events))
        .route("/video_feed", get(stream::video_feed))
        .route("/api/trigger", post(api::trigger))
        .route("/api/stop", post(api::stop))
        .route("/api/speak", post(api::speak))
        .route("/api/status", get(api::status))
        .route("/api/log", get(api::log_history))
        .with_state(state)
}

#[cfg(test)]
pub(crate) fn test_state(player: crate::playback::PlaybackController) -> ServerState {
    let (orchestrator, hub, frames) = crate::pipeline::fakes::orchestrator(player);
    ServerState {
        orchestrator,
        hub,
        frames,
    }
}
