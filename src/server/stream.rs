//! Long-lived responses: the SSE event stream and the MJPEG video feed.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header;
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::{self, Stream, StreamExt};

use super::ServerState;
use crate::camera::FrameStore;
use crate::events::{Delivery, Event};

/// Poll interval of the video feed.
const FRAME_INTERVAL: Duration = Duration::from_millis(50);
const BOUNDARY: &str = "FRAME";

// ---------------------------------------------------------------------------
// /events
// ---------------------------------------------------------------------------

/// `GET /events`.  The first event is the current status; keep-alives are
/// sent as SSE comments.  A client that stops reading is dropped by the hub
/// and its stream ends.
pub async fn events(
    State(state): State<ServerState>,
) -> Sse<impl Stream<Item = Result<SseEvent, axum::Error>>> {
    // Subscribe first so no transition falls between the snapshot and the feed.
    let subscription = state.hub.subscribe();
    log::debug!("server: sse subscriber {} connected", subscription.id());

    let current = Delivery::Event(Arc::new(Event::status(state.orchestrator.phase())));
    let deliveries = stream::once(async move { current }).chain(subscription.into_stream());

    Sse::new(deliveries.map(to_sse))
}

fn to_sse(delivery: Delivery) -> Result<SseEvent, axum::Error> {
    match delivery {
        Delivery::Event(event) => SseEvent::default().event(event.name()).json_data(&*event),
        Delivery::KeepAlive => Ok(SseEvent::default().comment("keep-alive")),
    }
}

// ---------------------------------------------------------------------------
// /video_feed
// ---------------------------------------------------------------------------

/// `GET /video_feed`: `multipart/x-mixed-replace` JPEG stream.  Each new
/// display frame is sent once; while a capture is frozen the feed holds it.
pub async fn video_feed(State(state): State<ServerState>) -> Response {
    let body = Body::from_stream(frame_parts(Arc::clone(&state.frames)));
    (
        [
            (
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
            ),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        body,
    )
        .into_response()
}

fn frame_parts(frames: Arc<FrameStore>) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    stream::unfold((frames, 0u64), |(frames, last_seq)| async move {
        loop {
            if let Some(snapshot) = frames.display_frame() {
                if snapshot.seq != last_seq {
                    let part = multipart_part(&snapshot.encoded);
                    return Some((Ok(part), (frames, snapshot.seq)));
                }
            }
            tokio::time::sleep(FRAME_INTERVAL).await;
        }
    })
}

fn multipart_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
