use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use shared::Envelope;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{deliver, report_closed, ConnectionSlot, Outbound, CLOSED_BY_HOST};
use crate::application::ports::{
    SignalingChannel, SignalingError, SignalingEvent, SignalingEventSender,
};
use crate::domain::Endpoint;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Signaling over a WebSocket at `ws://host:port/`, one text frame per envelope
#[derive(Default)]
pub struct WebSocketSignalingChannel {
    slot: ConnectionSlot,
}

impl WebSocketSignalingChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalingChannel for WebSocketSignalingChannel {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
        events: SignalingEventSender,
    ) -> Result<(), SignalingError> {
        self.slot.ensure_vacant()?;

        let url = format!("ws://{}/", endpoint);
        debug!("Opening signaling WebSocket {}", url);
        let (stream, _response) = tokio::time::timeout(timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| SignalingError::Timeout {
                endpoint: endpoint.to_string(),
                timeout,
            })?
            .map_err(|e| SignalingError::ConnectFailed {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        let opened = self.slot.open()?;
        let (sink, source) = stream.split();

        let _ = events.send(SignalingEvent::Connected);
        tokio::spawn(read_loop(
            source,
            events,
            opened.cancel.clone(),
            opened.connected,
        ));
        let writer = tokio::spawn(write_loop(sink, opened.outbound, opened.cancel));
        self.slot.attach_writer(writer);

        info!("Signaling WebSocket connected to {}", endpoint);
        Ok(())
    }

    fn send(&self, envelope: &Envelope) {
        self.slot.send(envelope);
    }

    async fn disconnect(&self) {
        self.slot.close().await;
    }

    fn is_connected(&self) -> bool {
        self.slot.is_connected()
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    cancel: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            item = outbound.recv() => item,
        };

        match item {
            Some(Outbound::Envelope(envelope)) => {
                let text = match envelope.to_text() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode {}: {}", envelope.message_type, e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!("Failed to write to signaling WebSocket: {}", e);
                    break;
                }
            }
            Some(Outbound::Close) | None => {
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
                break;
            }
        }
    }
    debug!("Signaling writer task ended");
}

async fn read_loop(
    mut source: SplitStream<WsStream>,
    events: SignalingEventSender,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
) {
    let reason = loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            message = source.next() => message,
        };

        match message {
            Some(Ok(Message::Text(text))) => deliver(&events, text.as_bytes()),
            Some(Ok(Message::Binary(data))) => deliver(&events, &data),
            Some(Ok(Message::Close(_))) => break CLOSED_BY_HOST.to_string(),
            Some(Ok(_)) => {}
            Some(Err(e)) => break format!("signaling channel closed: {}", e),
            None => break CLOSED_BY_HOST.to_string(),
        }
    };
    report_closed(&connected, &events, reason);
}
