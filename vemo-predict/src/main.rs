//! vemo-predict - Speech Emotion Prediction Microservice
//!
//! **Module Identity:**
//! - Name: vemo-predict
//! - Default port: 5000
//!
//! Subcommands:
//! - `serve` (default): HTTP service with `POST /predict` and `GET /health`
//! - `classify <FILE>`: run one file through the pipeline, print the JSON body
//! - `check-codec [<FILE>]`: validate the codec backend, optionally convert FILE

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vemo_predict::audio::{build_transcoder, AudioNormalizer, StagingArea};
use vemo_predict::audio::CodecBackend;
use vemo_predict::config::{ConfigOverrides, ServiceConfig};
use vemo_predict::models::{PredictResponse, UploadedAudio};
use vemo_predict::AppState;

/// Command-line arguments for vemo-predict
#[derive(Parser, Debug)]
#[command(name = "vemo-predict")]
#[command(about = "Speech emotion prediction microservice")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Configuration file (otherwise VEMO_CONFIG or the default locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, global = true, env = "VEMO_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, global = true, env = "VEMO_PORT")]
    port: Option<u16>,

    /// XGBoost JSON classifier
    #[arg(long, global = true, env = "VEMO_MODEL_PATH")]
    model: Option<PathBuf>,

    /// Label encoder JSON
    #[arg(long, global = true, env = "VEMO_LABELS_PATH")]
    labels: Option<PathBuf>,

    /// Directory for per-request scratch files
    #[arg(long, global = true, env = "VEMO_STAGING_DIR")]
    staging_dir: Option<PathBuf>,

    /// Codec backend: native or ffmpeg
    #[arg(long, global = true, env = "VEMO_CODEC")]
    codec: Option<CodecBackend>,

    /// ffmpeg binary for the ffmpeg backend
    #[arg(long, global = true, env = "VEMO_FFMPEG_PATH")]
    ffmpeg: Option<PathBuf>,

    /// Normalize .wav uploads as well
    #[arg(long, global = true, env = "VEMO_ALWAYS_NORMALIZE")]
    always_normalize: bool,

    /// Log filter, e.g. "vemo_predict=debug" (RUST_LOG takes precedence)
    #[arg(long, global = true, env = "VEMO_LOG")]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service
    Serve,
    /// Predict the emotion of one audio file and print the JSON result
    Classify {
        file: PathBuf,
    },
    /// Validate the codec backend, optionally converting a sample file
    CheckCodec {
        file: Option<PathBuf>,
    },
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            classifier_path: self.model.clone(),
            label_encoder_path: self.labels.clone(),
            staging_dir: self.staging_dir.clone(),
            codec_backend: self.codec,
            ffmpeg_path: self.ffmpeg.clone(),
            always_normalize: self.always_normalize,
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = ServiceConfig::load(cli.config.as_deref(), cli.overrides())
        .context("Failed to load configuration")?;

    init_tracing(&config.logging.level);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await.map(|_| ExitCode::SUCCESS),
        Command::Classify { file } => classify(config, &file).await,
        Command::CheckCodec { file } => check_codec(config, file.as_deref()),
    }
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(config: ServiceConfig) -> Result<()> {
    info!("Starting vemo-predict (Speech Emotion Prediction) microservice");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    config.log_summary();

    let inference = vemo_predict::build_inference_service(&config)
        .context("Failed to initialize prediction pipeline")?;
    if let Some(reason) = inference.model().unavailable_reason() {
        tracing::warn!("Serving in degraded mode, predictions will fail: {}", reason);
    }

    let state = AppState::new(Arc::new(inference));
    let app = vemo_predict::build_router(state, config.server.max_upload_bytes);

    let addr = config.bind_address()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn classify(config: ServiceConfig, file: &Path) -> Result<ExitCode> {
    let inference = Arc::new(
        vemo_predict::build_inference_service(&config)
            .context("Failed to initialize prediction pipeline")?,
    );

    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    match inference.handle_blocking(Some(UploadedAudio::new(file_name, bytes))).await {
        Ok(prediction) => {
            let body = PredictResponse::from(prediction);
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&e.to_response_body())?);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn check_codec(config: ServiceConfig, file: Option<&Path>) -> Result<ExitCode> {
    let transcoder = build_transcoder(config.codec.backend, &config.codec.ffmpeg_path)
        .with_context(|| format!("Codec backend '{}' is not usable", config.codec.backend))?;
    println!("codec backend: {} (ok)", transcoder.describe());

    let Some(file) = file else {
        return Ok(ExitCode::SUCCESS);
    };

    let staging = StagingArea::new(&config.audio.staging_dir)?;
    let mut scope = staging.scope();
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staged = scope.stage(&UploadedAudio::new(file_name, bytes))?;
    let output = scope.reserve_canonical()?;

    match AudioNormalizer::new(transcoder).normalize(&staged, &output) {
        Ok(canonical) => {
            println!(
                "converted: {} frames, {} channel(s), {} Hz ({:.2} s)",
                canonical.frames,
                canonical.channels,
                canonical.sample_rate,
                canonical.frames as f64 / canonical.sample_rate as f64
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("conversion failed: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
