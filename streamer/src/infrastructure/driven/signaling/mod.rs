// Signaling channel adapters

pub mod tcp;
pub mod websocket;

pub use tcp::TcpSignalingChannel;
pub use websocket::WebSocketSignalingChannel;

use serde::{Deserialize, Serialize};
use shared::Envelope;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::application::ports::{
    SignalingChannel, SignalingChannelFactory, SignalingError, SignalingEvent,
    SignalingEventSender,
};

/// How long a graceful close may take to flush queued messages
const CLOSE_GRACE: Duration = Duration::from_millis(500);

pub(crate) const CLOSED_BY_HOST: &str = "signaling channel closed by host";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalingTransport {
    #[default]
    WebSocket,
    Tcp,
}

impl FromStr for SignalingTransport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "websocket" | "ws" => Ok(Self::WebSocket),
            "tcp" => Ok(Self::Tcp),
            other => Err(format!("unknown signaling transport '{}'", other)),
        }
    }
}

impl fmt::Display for SignalingTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WebSocket => f.write_str("websocket"),
            Self::Tcp => f.write_str("tcp"),
        }
    }
}

/// Creates a fresh channel of the configured transport per session
pub struct TransportChannelFactory {
    transport: SignalingTransport,
}

impl TransportChannelFactory {
    pub fn new(transport: SignalingTransport) -> Self {
        Self { transport }
    }
}

impl SignalingChannelFactory for TransportChannelFactory {
    fn create(&self) -> Arc<dyn SignalingChannel> {
        match self.transport {
            SignalingTransport::WebSocket => Arc::new(WebSocketSignalingChannel::new()),
            SignalingTransport::Tcp => Arc::new(TcpSignalingChannel::new()),
        }
    }
}

/// Work item for a transport's writer task
pub(crate) enum Outbound {
    Envelope(Envelope),
    Close,
}

struct Connection {
    outbound: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
    writer: Option<JoinHandle<()>>,
}

/// Handed to a transport right after its socket is established
pub(crate) struct Opened {
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
    pub cancel: CancellationToken,
    pub connected: Arc<AtomicBool>,
}

/// Connection bookkeeping shared by the transports: the outbound queue,
/// the task cancellation and the connected flag
#[derive(Default)]
pub(crate) struct ConnectionSlot {
    connection: Mutex<Option<Connection>>,
    connected: Arc<AtomicBool>,
}

impl ConnectionSlot {
    pub fn ensure_vacant(&self) -> Result<(), SignalingError> {
        match self.connection.lock() {
            Ok(connection) if connection.is_none() => Ok(()),
            _ => Err(SignalingError::AlreadyConnected),
        }
    }

    /// Mark the slot connected and hand out the task side of the queue
    pub fn open(&self) -> Result<Opened, SignalingError> {
        let mut connection = self
            .connection
            .lock()
            .map_err(|_| SignalingError::AlreadyConnected)?;
        if connection.is_some() {
            return Err(SignalingError::AlreadyConnected);
        }

        let (outbound_tx, outbound) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        *connection = Some(Connection {
            outbound: outbound_tx,
            cancel: cancel.clone(),
            writer: None,
        });
        self.connected.store(true, Ordering::SeqCst);

        Ok(Opened {
            outbound,
            cancel,
            connected: self.connected.clone(),
        })
    }

    pub fn attach_writer(&self, writer: JoinHandle<()>) {
        if let Ok(mut connection) = self.connection.lock() {
            match connection.as_mut() {
                Some(connection) => connection.writer = Some(writer),
                None => writer.abort(),
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn send(&self, envelope: &Envelope) {
        if !self.is_connected() {
            debug!("Dropping {}: signaling channel not connected", envelope.message_type);
            return;
        }
        if let Ok(connection) = self.connection.lock() {
            if let Some(connection) = connection.as_ref() {
                let _ = connection.outbound.send(Outbound::Envelope(envelope.clone()));
            }
        }
    }

    /// Flush queued messages, send the transport's close notification, then
    /// stop both tasks. Repeated calls do nothing.
    pub async fn close(&self) {
        let connection = match self.connection.lock() {
            Ok(mut connection) => connection.take(),
            Err(_) => None,
        };
        let Some(connection) = connection else {
            return;
        };
        self.connected.store(false, Ordering::SeqCst);

        let _ = connection.outbound.send(Outbound::Close);
        if let Some(writer) = connection.writer {
            if tokio::time::timeout(CLOSE_GRACE, writer).await.is_err() {
                warn!("Signaling writer did not finish within {:?}", CLOSE_GRACE);
            }
        }
        connection.cancel.cancel();
    }
}

/// Decode one inbound message and queue it for the orchestrator
pub(crate) fn deliver(events: &SignalingEventSender, bytes: &[u8]) {
    let event = match Envelope::decode(bytes) {
        Ok(envelope) => SignalingEvent::Envelope(envelope),
        Err(e) => {
            warn!("Discarding inbound signaling message: {}", e);
            SignalingEvent::Error(e.to_string())
        }
    };
    let _ = events.send(event);
}

/// Report a remote close, unless the channel was closed locally first
pub(crate) fn report_closed(connected: &AtomicBool, events: &SignalingEventSender, reason: String) {
    if connected.swap(false, Ordering::SeqCst) {
        debug!("Signaling connection lost: {}", reason);
        let _ = events.send(SignalingEvent::Disconnected(reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::MessageType;

    #[test]
    fn test_transport_parsing() {
        assert_eq!("ws".parse(), Ok(SignalingTransport::WebSocket));
        assert_eq!("TCP".parse(), Ok(SignalingTransport::Tcp));
        assert!("quic".parse::<SignalingTransport>().is_err());
        assert_eq!(SignalingTransport::default().to_string(), "websocket");
    }

    #[tokio::test]
    async fn test_slot_lifecycle() {
        let slot = ConnectionSlot::default();
        assert!(slot.ensure_vacant().is_ok());

        let mut opened = slot.open().unwrap();
        assert!(slot.is_connected());
        assert!(matches!(slot.open(), Err(SignalingError::AlreadyConnected)));

        slot.send(&Envelope::empty(MessageType::Pong, "abc"));
        assert!(matches!(
            opened.outbound.recv().await,
            Some(Outbound::Envelope(e)) if e.message_type == MessageType::Pong
        ));

        slot.close().await;
        assert!(!slot.is_connected());
        assert!(opened.cancel.is_cancelled());
        assert!(matches!(opened.outbound.recv().await, Some(Outbound::Close)));

        slot.close().await;
        assert!(slot.ensure_vacant().is_ok());
    }

    #[test]
    fn test_remote_close_reported_once() {
        let (events, mut rx) = mpsc::unbounded_channel();
        let connected = AtomicBool::new(true);

        report_closed(&connected, &events, CLOSED_BY_HOST.to_string());
        report_closed(&connected, &events, CLOSED_BY_HOST.to_string());

        assert_eq!(
            rx.try_recv().unwrap(),
            SignalingEvent::Disconnected(CLOSED_BY_HOST.to_string())
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_malformed_message_becomes_error_event() {
        let (events, mut rx) = mpsc::unbounded_channel();
        deliver(&events, b"not json");
        deliver(&events, br#"{"type":"pong","session_id":"s1","payload":{}}"#);

        assert!(matches!(rx.try_recv().unwrap(), SignalingEvent::Error(_)));
        match rx.try_recv().unwrap() {
            SignalingEvent::Envelope(envelope) => {
                assert_eq!(envelope.message_type, MessageType::Pong);
                assert_eq!(envelope.session_id, "s1");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
