//! Application entry point.
//!
//! ```text
//! narrate [--config PATH]          orchestrator service
//! narrate worker [--config PATH]   vision inference worker (spawned by the service)
//! ```
//!
//! # Startup sequence (service)
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] (defaults on first run) and apply env overrides.
//! 3. Create the [`tokio`] runtime.
//! 4. Start the camera reader feeding the [`FrameStore`].
//! 5. Build the inference boundary and warm its worker up in the background.
//! 6. Build speech, playback and the [`Orchestrator`].
//! 7. Spawn the voice listener thread.
//! 8. Serve the UI until Ctrl+C, then stop playback and the worker.

use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use narrate::{
    camera::{CameraReader, FrameStore},
    config::{AppConfig, AppPaths},
    events::{EventHub, LogLevel},
    inference::{run_worker, ApiVisionEngine, InferenceBoundary, ProcessLauncher},
    listener::VoiceListener,
    pipeline::{Orchestrator, OrchestratorConfig},
    playback::PlaybackController,
    server::{router, ServerState},
    speech::{PiperSynthesizer, SpeechSynthesizer},
};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "narrate", about = "Camera narration service")]
struct Cli {
    /// Settings file (defaults to the platform config dir)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand, PartialEq)]
enum Command {
    /// Vision inference worker, spawned by the service
    Worker,
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging (stderr; a worker's stdout is its protocol channel)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let paths = match &cli.config {
        Some(path) => AppPaths::with_settings_file(path),
        None => AppPaths::new(),
    };

    // 2. Configuration
    let config = AppConfig::load_from(&paths.settings_file)
        .unwrap_or_else(|e| {
            log::warn!("Failed to load config ({e}); using defaults");
            AppConfig::default()
        })
        .with_env_overrides();

    if cli.command == Some(Command::Worker) {
        return worker(&config);
    }

    log::info!("Narrate starting up");

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(serve(config, paths))
}

/// Worker mode: serve describe requests on stdin/stdout until stdin closes.
fn worker(config: &AppConfig) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    run_worker(
        || ApiVisionEngine::connect(&config.inference),
        stdin.lock(),
        stdout.lock(),
    )
    .context("worker protocol channel failed")
}

/// How long shutdown waits for an in-flight inference before giving up.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

async fn serve(config: AppConfig, paths: AppPaths) -> anyhow::Result<()> {
    let hub = EventHub::from_config(&config.server);
    let frames = Arc::new(FrameStore::new());

    // 4. Camera
    let _camera = if config.camera.enabled {
        match CameraReader::spawn(&config.camera, Arc::clone(&frames)) {
            Ok(reader) => Some(reader),
            Err(e) => {
                hub.log(LogLevel::Warn, format!("camera: {e}; no frames will be captured"));
                None
            }
        }
    } else {
        None
    };

    // 5. Inference boundary
    let launcher = ProcessLauncher::current_exe(
        Some(paths.settings_file.as_path()),
        config.inference.startup_timeout(),
    )
    .context("cannot locate own executable for the inference worker")?;
    let inference = Arc::new(InferenceBoundary::new(
        Arc::new(launcher),
        config.inference.timeout(),
    ));
    {
        let inference = Arc::clone(&inference);
        let hub = hub.clone();
        tokio::spawn(async move {
            match inference.warm_up().await {
                Ok(()) => hub.log(LogLevel::Info, "inference: worker ready"),
                Err(e) => hub.log(LogLevel::Warn, format!("inference: worker not ready: {e}")),
            }
        });
    }

    // 6. Speech, playback, orchestrator
    let speech: Arc<dyn SpeechSynthesizer> =
        Arc::new(PiperSynthesizer::from_config(&config.speech, &paths));
    let playback = Arc::new(PlaybackController::from_config(&config.playback));
    let orchestrator = Orchestrator::new(
        hub.clone(),
        Arc::clone(&frames),
        Arc::clone(&inference),
        speech,
        playback,
        OrchestratorConfig::from_app(&config),
    );

    // 7. Voice listener
    let _listener = config.listener.enabled.then(|| {
        VoiceListener::spawn(
            config.listener.clone(),
            paths.clone(),
            orchestrator.busy_flag(),
            Arc::new(orchestrator.clone()),
            hub.clone(),
        )
    });

    // 8. HTTP
    let app = router(ServerState {
        orchestrator: orchestrator.clone(),
        hub: hub.clone(),
        frames,
    });
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("cannot bind {}", config.server.bind_addr))?;
    log::info!("server: listening on http://{}", listener.local_addr()?);
    hub.log(LogLevel::Info, "narrate ready");

    // SSE and video streams never end on their own, so shutdown does not
    // wait for open connections.
    tokio::select! {
        result = axum::serve(listener, app).into_future() => result.context("server failed")?,
        _ = tokio::signal::ctrl_c() => log::info!("Received Ctrl+C, shutting down"),
    }
    orchestrator.stop();
    if tokio::time::timeout(SHUTDOWN_GRACE, inference.shutdown())
        .await
        .is_err()
    {
        log::warn!("inference: worker busy at shutdown; it exits when its stdin closes");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("narrate").chain(list.iter().copied()))
    }

    #[test]
    fn parses_modes() {
        let service = args(&[]).unwrap();
        assert_eq!(service.command, None);
        assert!(service.config.is_none());

        let worker = args(&["worker", "--config", "/tmp/s.toml"]).unwrap();
        assert_eq!(worker.command, Some(Command::Worker));
        assert_eq!(worker.config, Some(PathBuf::from("/tmp/s.toml")));

        let before = args(&["--config", "/tmp/s.toml", "worker"]).unwrap();
        assert_eq!(before.config, worker.config);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(args(&["--config"]).is_err());
        assert!(args(&["--verbose"]).is_err());
        assert!(args(&["serve"]).is_err());
    }
}
