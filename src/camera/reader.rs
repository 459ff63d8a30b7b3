//! Dedicated OS-thread MJPEG reader over the camera program's stdout.
//!
//! ```text
//! rpicam-vid ──stdout──▶ [camera-reader thread] ──▶ MjpegSplitter ──▶ FrameStore::publish_jpeg
//! ```
//!
//! The camera program is a child of this process; [`CameraReader`] owns it
//! and kills it on drop, which in turn ends the reader thread at EOF.

use std::io::{ErrorKind as IoErrorKind, Read};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use super::mjpeg::MjpegSplitter;
use super::snapshot::FrameStore;
use crate::config::CameraConfig;

const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera program {0:?} not found")]
    NotFound(String),

    #[error("failed to start camera program: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("camera program has no stdout")]
    NoStdout,
}

/// Handle to the running camera process and its reader thread.
pub struct CameraReader {
    child: Child,
    running: Arc<AtomicBool>,
    _thread: std::thread::JoinHandle<()>,
}

impl CameraReader {
    /// Start `config.program` and feed every frame it produces into `store`.
    pub fn spawn(config: &CameraConfig, store: Arc<FrameStore>) -> Result<Self, CameraError> {
        let mut cmd = Command::new(&config.program);
        cmd.args(["-t", "0", "-n", "--codec", "mjpeg", "-o", "-"])
            .arg("--width")
            .arg(config.width.to_string())
            .arg("--height")
            .arg(config.height.to_string());
        Self::spawn_command(cmd, &config.program, store)
    }

    /// Start an arbitrary command that writes MJPEG to stdout.
    pub fn spawn_command(
        mut cmd: Command,
        program: &str,
        store: Arc<FrameStore>,
    ) -> Result<Self, CameraError> {
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                IoErrorKind::NotFound => CameraError::NotFound(program.to_string()),
                _ => CameraError::Spawn(e),
            })?;

        let Some(mut stdout) = child.stdout.take() else {
            let _ = child.kill();
            return Err(CameraError::NoStdout);
        };

        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);

        let thread = std::thread::Builder::new()
            .name("camera-reader".into())
            .spawn(move || {
                let mut splitter = MjpegSplitter::new();
                let mut chunk = vec![0u8; READ_CHUNK];
                let mut frames = 0u64;

                loop {
                    let n = match stdout.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(n) => n,
                        Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
                        Err(e) => {
                            log::debug!("camera: read error: {e}");
                            break;
                        }
                    };

                    for jpeg in splitter.push(&chunk[..n]) {
                        match store.publish_jpeg(jpeg) {
                            Ok(_) => {
                                frames += 1;
                                if frames == 1 {
                                    log::info!("camera: first frame received");
                                }
                            }
                            Err(e) => log::debug!("camera: dropping undecodable frame: {e}"),
                        }
                    }
                }

                running_clone.store(false, Ordering::Relaxed);
                log::info!("camera: stream ended after {frames} frames");
            })
            .expect("failed to spawn camera reader thread");

        log::info!("camera: started {program}");
        Ok(Self {
            child,
            running,
            _thread: thread,
        })
    }

    /// `false` once the camera program's stream has ended.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

impl Drop for CameraReader {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn missing_program_is_not_found() {
        let config = CameraConfig {
            program: "/nonexistent/narrate-camera".into(),
            ..CameraConfig::default()
        };
        let result = CameraReader::spawn(&config, Arc::new(FrameStore::new()));
        assert!(matches!(result, Err(CameraError::NotFound(_))));
    }

    #[test]
    fn frames_from_child_reach_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.jpg");
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([0, 128, 255]));
        img.save_with_format(&path, image::ImageFormat::Jpeg).unwrap();

        let mut cmd = Command::new("cat");
        cmd.arg(&path).arg(&path);

        let store = Arc::new(FrameStore::new());
        let reader = CameraReader::spawn_command(cmd, "cat", Arc::clone(&store)).unwrap();

        assert!(wait_for(|| store.read().map(|s| s.seq) == Some(2)));
        assert!(wait_for(|| !reader.is_running()));
        assert_eq!(store.read().unwrap().decoded.width, 4);
    }
}
