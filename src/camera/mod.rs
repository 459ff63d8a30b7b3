//! Camera frames: the MJPEG reader that produces them and the snapshot store
//! that holds the latest one.
//!
//! ```text
//! CameraReader (thread) ──publish_jpeg──▶ FrameStore ──read──▶ pipeline
//!                                             └──display_frame──▶ /video_feed
//! ```

pub mod mjpeg;
pub mod reader;
pub mod snapshot;

pub use mjpeg::MjpegSplitter;
pub use reader::{CameraError, CameraReader};
pub use snapshot::{DecodedFrame, FrameError, FrameSnapshot, FrameStore};
