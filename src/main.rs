//! gazed - gaze-to-cursor mapping daemon.
//!
//! Ingests gaze samples and face-distance readings over a Unix socket,
//! runs the conditioning pipeline, and broadcasts cursor positions and UI
//! adaptation events to connected clients.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use calloop::EventLoop;
use clap::Parser;
use tracing::info;

use gazed::clock::SystemClock;
use gazed::ipc::IpcServer;
use gazed::pipeline::PipelineConfig;
use gazed::state::DaemonState;

#[derive(Parser, Debug)]
#[command(name = "gazed", about = "Gaze-to-cursor mapping daemon")]
struct Cli {
    /// IPC socket path (default: $XDG_RUNTIME_DIR/gazed.sock)
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Minimum confidence for a gaze sample to enter the pipeline
    #[arg(long, default_value_t = 0.5)]
    confidence_min: f64,

    /// EMA smoothing coefficient, in (0, 1]
    #[arg(long, default_value_t = 0.3)]
    alpha: f64,

    /// Calibration targets per grid axis
    #[arg(long, default_value_t = 3)]
    grid: usize,

    /// Fixation time per calibration target (ms)
    #[arg(long, default_value_t = 1500)]
    dwell_ms: i64,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("gazed {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gazed=info".into()),
        )
        .init();

    info!("gazed v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = PipelineConfig::default();
    config.confidence_min = cli.confidence_min;
    config.smoothing_alpha = cli.alpha;
    config.calibration.grid = cli.grid;
    config.calibration.dwell_ms = cli.dwell_ms;

    let socket_path = cli.socket.unwrap_or_else(IpcServer::default_socket_path);

    let mut event_loop: EventLoop<'static, DaemonState> = EventLoop::try_new()?;
    let loop_handle = event_loop.handle();

    let mut state = DaemonState::new(
        config,
        Arc::new(SystemClock::new()),
        IpcServer::new(socket_path.clone()),
        loop_handle.clone(),
    );
    IpcServer::bind(&socket_path, &loop_handle)?;

    info!(socket = %socket_path.display(), "ready");

    event_loop.run(Duration::from_millis(16), &mut state, |state| {
        IpcServer::poll_clients(state);
    })?;

    Ok(())
}
