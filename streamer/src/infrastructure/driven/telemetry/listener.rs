use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use shared::{parse_line, LineFramer};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::hands::HandTracker;
use super::stats::InterArrivalStats;

const MAX_DATAGRAM: usize = 65536;
const TCP_READ_BUFFER: usize = 4096;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryProtocol {
    #[default]
    Udp,
    Tcp,
}

impl TelemetryProtocol {
    pub fn default_host(self) -> &'static str {
        match self {
            Self::Udp => "0.0.0.0",
            Self::Tcp => "localhost",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::Udp => 9000,
            Self::Tcp => 8000,
        }
    }
}

impl FromStr for TelemetryProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "udp" => Ok(Self::Udp),
            "tcp" => Ok(Self::Tcp),
            other => Err(format!("unknown telemetry protocol '{}'", other)),
        }
    }
}

impl fmt::Display for TelemetryProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Udp => f.write_str("udp"),
            Self::Tcp => f.write_str("tcp"),
        }
    }
}

/// What the listener does with each line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListenMode {
    /// Log every line
    #[default]
    Log,
    /// Count lines per report interval
    Tally,
    /// Gap statistics between consecutive lines
    Interarrival,
    /// Track the latest pose of each hand
    Hands,
}

impl FromStr for ListenMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "tally" => Ok(Self::Tally),
            "interarrival" => Ok(Self::Interarrival),
            "hands" => Ok(Self::Hands),
            other => Err(format!("unknown listen mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub protocol: TelemetryProtocol,
    pub host: String,
    pub port: u16,
    pub mode: ListenMode,
    pub report_interval: Duration,
    /// Answer every UDP datagram with a single zero byte
    pub handshake: bool,
}

/// Mode-specific processing of received lines
pub struct TelemetrySink {
    mode: ListenMode,
    lines: Arc<AtomicU64>,
    window: u64,
    unparsed: u64,
    arrivals: InterArrivalStats,
    hands: HandTracker,
}

impl TelemetrySink {
    pub fn new(mode: ListenMode) -> Self {
        Self {
            mode,
            lines: Arc::new(AtomicU64::new(0)),
            window: 0,
            unparsed: 0,
            arrivals: InterArrivalStats::new(),
            hands: HandTracker::new(),
        }
    }

    pub fn lines(&self) -> u64 {
        self.lines.load(Ordering::Relaxed)
    }

    pub fn hands(&self) -> &HandTracker {
        &self.hands
    }

    /// Lines that did not parse as telemetry (hands mode only)
    pub fn unparsed(&self) -> u64 {
        self.unparsed
    }

    pub fn handle_line(&mut self, line: &str, from: SocketAddr) {
        self.lines.fetch_add(1, Ordering::Relaxed);
        match self.mode {
            ListenMode::Log => info!("Message from {}: {}", from, line),
            ListenMode::Tally => self.window += 1,
            ListenMode::Interarrival => self.arrivals.record(Instant::now()),
            ListenMode::Hands => match parse_line(line) {
                Some(parsed) => self.hands.apply(parsed),
                None => {
                    self.unparsed += 1;
                    debug!("Unrecognized telemetry line from {}", from);
                }
            },
        }
    }

    /// Split a chunk of text into lines and handle each non-empty one
    pub fn handle_text(&mut self, text: &str, from: SocketAddr) {
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if !line.is_empty() {
                self.handle_line(line, from);
            }
        }
    }

    pub fn report(&mut self, interval: Duration) {
        match self.mode {
            ListenMode::Log => {}
            ListenMode::Tally => {
                info!(
                    "messages: {} in {:.1}s",
                    self.window,
                    interval.as_secs_f64()
                );
                self.window = 0;
            }
            ListenMode::Interarrival => info!("{}", self.arrivals.take_report()),
            ListenMode::Hands => info!("{}", self.hands),
        }
    }
}

enum Socket {
    Udp(UdpSocket),
    Tcp(TcpListener),
}

/// Host-side receiver for the hand telemetry stream
pub struct TelemetryListener {
    socket: Socket,
    config: ListenerConfig,
    sink: TelemetrySink,
}

impl TelemetryListener {
    pub async fn bind(config: ListenerConfig) -> Result<Self> {
        if config.report_interval.is_zero() {
            bail!("Report interval must be greater than zero");
        }
        let address = format!("{}:{}", config.host, config.port);
        let socket = match config.protocol {
            TelemetryProtocol::Udp => Socket::Udp(
                UdpSocket::bind(&address)
                    .await
                    .with_context(|| format!("Failed to bind UDP {}", address))?,
            ),
            TelemetryProtocol::Tcp => Socket::Tcp(
                TcpListener::bind(&address)
                    .await
                    .with_context(|| format!("Failed to bind TCP {}", address))?,
            ),
        };
        let sink = TelemetrySink::new(config.mode);
        Ok(Self {
            socket,
            config,
            sink,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        let address = match &self.socket {
            Socket::Udp(socket) => socket.local_addr(),
            Socket::Tcp(listener) => listener.local_addr(),
        };
        address.context("Failed to read listener address")
    }

    /// Running count of handled lines, readable while the listener runs
    pub fn progress(&self) -> Arc<AtomicU64> {
        self.sink.lines.clone()
    }

    /// Receive until cancelled, then hand back the sink with its final state
    pub async fn run(self, cancel: CancellationToken) -> Result<TelemetrySink> {
        let Self {
            socket,
            config,
            mut sink,
        } = self;
        info!(
            "Listening for {} telemetry on {}:{} ({:?} mode)",
            config.protocol, config.host, config.port, config.mode
        );

        match socket {
            Socket::Udp(socket) => run_udp(&socket, &config, &mut sink, &cancel).await?,
            Socket::Tcp(listener) => run_tcp(&listener, &config, &mut sink, &cancel).await?,
        }

        info!("Telemetry listener stopped after {} lines", sink.lines());
        Ok(sink)
    }
}

fn report_ticker(interval: Duration) -> tokio::time::Interval {
    tokio::time::interval_at(tokio::time::Instant::now() + interval, interval)
}

async fn run_udp(
    socket: &UdpSocket,
    config: &ListenerConfig,
    sink: &mut TelemetrySink,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut buffer = vec![0u8; MAX_DATAGRAM];
    let mut ticker = report_ticker(config.report_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => sink.report(config.report_interval),
            received = socket.recv_from(&mut buffer) => {
                let (n, from) = received.context("Failed to receive datagram")?;
                match std::str::from_utf8(&buffer[..n]) {
                    Ok(text) => sink.handle_text(text, from),
                    Err(_) => warn!("Non UTF-8 datagram of {} bytes from {}", n, from),
                }
                if config.handshake {
                    if let Err(e) = socket.send_to(&[0u8], from).await {
                        debug!("Handshake reply to {} failed: {}", from, e);
                    }
                }
            }
        }
    }
    Ok(())
}

struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
    framer: LineFramer,
}

async fn run_tcp(
    listener: &TcpListener,
    config: &ListenerConfig,
    sink: &mut TelemetrySink,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut buffer = vec![0u8; TCP_READ_BUFFER];
    let mut ticker = report_ticker(config.report_interval);
    let mut connection: Option<TcpConnection> = None;

    loop {
        let Some(active) = connection.as_mut() else {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => sink.report(config.report_interval),
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!("Accepted connection from {}", peer);
                        connection = Some(TcpConnection {
                            stream,
                            peer,
                            framer: LineFramer::new(),
                        });
                    }
                    Err(e) => warn!("Failed to accept telemetry connection: {}", e),
                },
            }
            continue;
        };

        let mut closed = false;
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => sink.report(config.report_interval),
            read = active.stream.read(&mut buffer) => match read {
                Ok(0) => closed = true,
                Ok(n) => {
                    for frame in active.framer.push(&buffer[..n]) {
                        match frame {
                            Ok(frame) => match std::str::from_utf8(&frame) {
                                Ok(line) => sink.handle_line(line, active.peer),
                                Err(_) => warn!("Non UTF-8 line from {}", active.peer),
                            },
                            Err(e) => warn!("Dropping telemetry from {}: {}", active.peer, e),
                        }
                    }
                }
                Err(e) => {
                    warn!("Telemetry connection from {} failed: {}", active.peer, e);
                    closed = true;
                }
            },
        }

        if closed {
            info!("Connection from {} closed", active.peer);
            connection = None;
        }
    }
    Ok(())
}
