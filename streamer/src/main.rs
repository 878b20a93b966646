//! Hand Tracking Streamer CLI
//!
//! ```bash
//! # Run one video session against a host until ctrl-c
//! hts-streamer video --host 192.168.1.20 --port 8765
//!
//! # Watch the telemetry stream arriving on UDP 9000
//! hts-streamer listen --protocol udp --mode interarrival --handshake
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hts_streamer::application::session::{
    SessionDependencies, SessionOrchestrator, StartSessionRequest,
};
use hts_streamer::config::Settings;
use hts_streamer::domain::SessionOptions;
use hts_streamer::infrastructure::driven::peer::WebRtcPeerFactory;
use hts_streamer::infrastructure::driven::signaling::{SignalingTransport, TransportChannelFactory};
use hts_streamer::infrastructure::driven::telemetry::{
    ListenMode, TelemetryListener, TelemetryProtocol,
};
use hts_streamer::infrastructure::driven::{ChannelDisconnectNotifier, TracingSessionObserver};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file; `hts-streamer.toml` in the working directory is used when present
    #[arg(long, global = true, env = "HTS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream video to a host for one session
    Video(VideoArgs),
    /// Receive hand telemetry on the host side
    Listen(ListenArgs),
}

#[derive(Args, Debug)]
struct VideoArgs {
    /// Host running the signaling endpoint
    #[arg(long, env = "HTS_HOST")]
    host: String,

    /// Signaling port
    #[arg(long, env = "HTS_PORT")]
    port: u16,

    /// Preset identifier forwarded to the host
    #[arg(long, default_value = "default")]
    preset: String,

    /// Log host statistics locally as they arrive
    #[arg(long, default_value_t = false)]
    debug_stats: bool,

    /// Signaling transport: websocket, tcp (overrides the settings file)
    #[arg(long)]
    transport: Option<SignalingTransport>,

    /// Send a synthetic test pattern instead of captured frames
    #[arg(long, default_value_t = false)]
    test_pattern: bool,
}

impl VideoArgs {
    /// Stats only change what gets logged here; nothing extra goes to the host.
    fn start_request(&self) -> StartSessionRequest {
        StartSessionRequest {
            host: self.host.clone(),
            port: self.port,
            options: SessionOptions {
                preset: self.preset.clone(),
                show_debug_stats: self.debug_stats,
            },
        }
    }
}

#[derive(Args, Debug)]
struct ListenArgs {
    /// Transport: udp, tcp (overrides the settings file)
    #[arg(long)]
    protocol: Option<TelemetryProtocol>,

    /// Bind address (defaults depend on the protocol)
    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// What to do with each line: log, tally, interarrival, hands
    #[arg(long, default_value = "log")]
    mode: ListenMode,

    /// Answer every UDP datagram with a single zero byte
    #[arg(long, default_value_t = false)]
    handshake: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    match cli.command {
        Command::Video(args) => run_video(&settings, args).await,
        Command::Listen(args) => run_listener(&settings, args).await,
    }
}

async fn run_video(settings: &Settings, args: VideoArgs) -> Result<()> {
    let transport = args.transport.unwrap_or(settings.signaling.transport);
    let (notifier, mut disconnections) = ChannelDisconnectNotifier::channel();

    let orchestrator = SessionOrchestrator::spawn(SessionDependencies {
        config: settings.session_config(),
        signaling: Arc::new(TransportChannelFactory::new(transport)),
        peers: Arc::new(WebRtcPeerFactory::new(settings.peer_settings(args.test_pattern))),
        notifier: Arc::new(notifier),
        observer: Some(Arc::new(TracingSessionObserver::new())),
    });

    let request = args.start_request();
    let session_id = orchestrator
        .start_session(request)
        .await
        .context("Failed to start video session")?;
    info!(session_id = %session_id, "Video session started over {}", transport);

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                info!("Interrupted, stopping session");
                orchestrator
                    .stop_session(None)
                    .await
                    .map(|_| ())
                    .context("Failed to stop video session")
            }
            Err(e) => Err(e).context("Failed to listen for ctrl-c"),
        },
        Some(disconnection) = disconnections.recv() => {
            error!(session_id = %disconnection.session_id, "Session ended: {}", disconnection.reason);
            Err(anyhow!("session disconnected: {}", disconnection.reason))
        }
    };

    orchestrator.shutdown().await;
    outcome
}

async fn run_listener(settings: &Settings, args: ListenArgs) -> Result<()> {
    let mut config = settings.listener_config(args.protocol, args.mode, args.handshake);
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let listener = TelemetryListener::bind(config).await?;
    let cancel = CancellationToken::new();

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupted, stopping listener"),
            Err(e) => error!("Failed to listen for ctrl-c: {}", e),
        }
        interrupt.cancel();
    });

    let sink = listener.run(cancel).await?;
    info!("Received {} lines in total", sink.lines());
    Ok(())
}
