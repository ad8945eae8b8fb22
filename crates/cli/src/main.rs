use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use facestream_core::analysis::infrastructure::onnx_yolo_analyzer::{
    OnnxYoloAnalyzerFactory, DEFAULT_CONFIDENCE,
};
use facestream_core::dispatch::analysis_dispatcher::AnalysisDispatcher;
use facestream_core::shared::constants::{
    DEFAULT_MAX_FACES, PROGRESS_LOG_INTERVAL, SINGLE_SHOT_MAX_HEIGHT, STREAM_MAX_HEIGHT,
    YOLO_MODEL_NAME, YOLO_MODEL_URL,
};
use facestream_core::shared::model_resolver::{self, ModelSource};
use facestream_server::config::{default_workers, ServiceConfig};
use facestream_server::server::{self, AppState};

/// How long shutdown waits for open sessions to close their analyzers.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Real-time face analysis over WebSocket and HTTP.
#[derive(Parser, Debug)]
#[command(name = "facestream", version)]
struct Cli {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on (0 picks a free port).
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// ONNX face model to load instead of the cached/downloaded one.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Directory with a pre-packaged model, checked before downloading.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
    confidence: f64,

    /// Faces reported per frame.
    #[arg(long, default_value_t = DEFAULT_MAX_FACES)]
    max_faces: usize,

    /// Analysis worker threads (default: one per core).
    #[arg(long)]
    workers: Option<usize>,

    /// Height bound for streamed frames.
    #[arg(long, default_value_t = STREAM_MAX_HEIGHT)]
    stream_max_height: u32,

    /// Height bound for single-shot frames.
    #[arg(long, default_value_t = SINGLE_SHOT_MAX_HEIGHT)]
    single_shot_max_height: u32,

    /// Single-shot request timeout in seconds (0 disables).
    #[arg(long, default_value_t = 30)]
    request_timeout: u64,

    /// Max WebSocket message / upload size in MiB.
    #[arg(long, default_value_t = 16)]
    max_message_mb: usize,

    /// Log session progress every N frames (0 disables).
    #[arg(long, default_value_t = PROGRESS_LOG_INTERVAL)]
    log_every: u64,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    // Blocking download; must happen before the async runtime starts.
    let model_path = resolve_model(&cli)?;
    let factory = Arc::new(OnnxYoloAnalyzerFactory::new(model_path, cli.confidence));
    let config = to_config(&cli);
    let dispatcher = Arc::new(AnalysisDispatcher::new(config.analysis_workers)?);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(AppState::new(config, factory, dispatcher)))
}

async fn serve(state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let (addr, server_task) = server::listen(state.clone()).await?;
    log::info!("Face analysis service ready on {addr} (WebSocket: ws://{addr}/ws/video)");

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down");
    state.shutdown.cancel();

    server_task.await??;
    if !server::drain_sessions(&state.registry, DRAIN_TIMEOUT).await {
        log::warn!(
            "{} session(s) still open after {}s",
            state.registry.len(),
            DRAIN_TIMEOUT.as_secs()
        );
    }
    Ok(())
}

fn resolve_model(cli: &Cli) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(path) = &cli.model {
        if !path.is_file() {
            return Err(format!("Model file not found: {}", path.display()).into());
        }
        return Ok(path.clone());
    }

    log::info!("Resolving model: {YOLO_MODEL_NAME}");
    let resolved = model_resolver::resolve(
        YOLO_MODEL_NAME,
        YOLO_MODEL_URL,
        cli.model_dir.as_deref(),
        Some(Box::new(download_progress)),
    )?;
    if resolved.source == ModelSource::Downloaded {
        eprintln!();
    }
    log::info!(
        "Using model {} ({:?})",
        resolved.path.display(),
        resolved.source
    );
    Ok(resolved.path)
}

fn to_config(cli: &Cli) -> ServiceConfig {
    ServiceConfig {
        host: cli.host.clone(),
        port: cli.port,
        stream_max_height: cli.stream_max_height,
        single_shot_max_height: cli.single_shot_max_height,
        max_faces: cli.max_faces,
        analysis_workers: cli.workers.unwrap_or_else(default_workers),
        request_timeout: (cli.request_timeout > 0)
            .then(|| Duration::from_secs(cli.request_timeout)),
        max_message_size: cli.max_message_mb * 1024 * 1024,
        progress_log_interval: cli.log_every,
    }
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&cli.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            cli.confidence
        )
        .into());
    }
    if cli.max_faces == 0 {
        return Err("--max-faces must be at least 1".into());
    }
    if cli.workers == Some(0) {
        return Err("--workers must be at least 1".into());
    }
    if cli.stream_max_height == 0 || cli.single_shot_max_height == 0 {
        return Err("Height bounds must be positive".into());
    }
    if cli.max_message_mb == 0 {
        return Err("--max-message-mb must be at least 1".into());
    }
    Ok(())
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}
