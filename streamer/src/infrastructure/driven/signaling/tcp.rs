use async_trait::async_trait;
use shared::{encode_frame, Envelope, LineFramer};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{deliver, report_closed, ConnectionSlot, Outbound, CLOSED_BY_HOST};
use crate::application::ports::{
    SignalingChannel, SignalingError, SignalingEvent, SignalingEventSender,
};
use crate::domain::Endpoint;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Signaling over a raw TCP stream, one JSON envelope per line
#[derive(Default)]
pub struct TcpSignalingChannel {
    slot: ConnectionSlot,
}

impl TcpSignalingChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalingChannel for TcpSignalingChannel {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
        events: SignalingEventSender,
    ) -> Result<(), SignalingError> {
        self.slot.ensure_vacant()?;

        let stream = tokio::time::timeout(
            timeout,
            TcpStream::connect((endpoint.host(), endpoint.port())),
        )
        .await
        .map_err(|_| SignalingError::Timeout {
            endpoint: endpoint.to_string(),
            timeout,
        })?
        .map_err(|e| SignalingError::ConnectFailed {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle on signaling socket: {}", e);
        }

        let opened = self.slot.open()?;
        let (reader, writer) = stream.into_split();

        let _ = events.send(SignalingEvent::Connected);
        tokio::spawn(read_loop(
            reader,
            events,
            opened.cancel.clone(),
            opened.connected,
        ));
        let writer = tokio::spawn(write_loop(writer, opened.outbound, opened.cancel));
        self.slot.attach_writer(writer);

        info!("Signaling TCP connected to {}", endpoint);
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
    mut writer: OwnedWriteHalf,
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
                let frame = match envelope.encode() {
                    Ok(bytes) => encode_frame(bytes),
                    Err(e) => {
                        warn!("Failed to encode {}: {}", envelope.message_type, e);
                        continue;
                    }
                };
                if let Err(e) = writer.write_all(&frame).await {
                    warn!("Failed to write to signaling socket: {}", e);
                    break;
                }
            }
            Some(Outbound::Close) | None => {
                let _ = writer.shutdown().await;
                break;
            }
        }
    }
    debug!("Signaling writer task ended");
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    events: SignalingEventSender,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
) {
    let mut framer = LineFramer::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    let reason = loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            read = reader.read(&mut buffer) => read,
        };

        match read {
            Ok(0) => break CLOSED_BY_HOST.to_string(),
            Ok(n) => {
                for frame in framer.push(&buffer[..n]) {
                    match frame {
                        Ok(frame) => deliver(&events, &frame),
                        Err(e) => {
                            warn!("Discarding inbound signaling frame: {}", e);
                            let _ = events.send(SignalingEvent::Error(e.to_string()));
                        }
                    }
                }
            }
            Err(e) => break format!("signaling channel closed: {}", e),
        }
    };
    report_closed(&connected, &events, reason);
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::MessageType;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<SignalingEvent>) -> SignalingEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_line_delimited_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let host = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();

            let line = lines.next_line().await.unwrap().unwrap();
            let hello = Envelope::decode(line.as_bytes()).unwrap();
            assert_eq!(hello.message_type, MessageType::Hello);

            // Two messages in one write, the second split across writes
            let ack = Envelope::empty(MessageType::HelloAck, hello.session_id.clone());
            let mut bytes = encode_frame(ack.encode().unwrap());
            bytes.extend_from_slice(b"garbage\r\n{\"type\":\"po");
            writer.write_all(&bytes).await.unwrap();
            writer.write_all(b"ng\",\"session_id\":\"session-1\"}\n").await.unwrap();
            writer.shutdown().await.unwrap();
        });

        let channel = TcpSignalingChannel::new();
        let (events, mut rx) = mpsc::unbounded_channel();
        let endpoint = Endpoint::new("127.0.0.1", port).unwrap();
        channel
            .connect(&endpoint, Duration::from_secs(2), events)
            .await
            .unwrap();
        assert_eq!(next_event(&mut rx).await, SignalingEvent::Connected);

        channel.send(&Envelope::empty(MessageType::Hello, "session-1"));

        match next_event(&mut rx).await {
            SignalingEvent::Envelope(envelope) => {
                assert_eq!(envelope.message_type, MessageType::HelloAck);
                assert_eq!(envelope.session_id, "session-1");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(next_event(&mut rx).await, SignalingEvent::Error(_)));
        match next_event(&mut rx).await {
            SignalingEvent::Envelope(envelope) => {
                assert_eq!(envelope.message_type, MessageType::Pong)
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(
            next_event(&mut rx).await,
            SignalingEvent::Disconnected(CLOSED_BY_HOST.to_string())
        );

        host.await.unwrap();
        channel.disconnect().await;
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_flushes_then_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let host = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = String::new();
            stream.read_to_string(&mut received).await.unwrap();
            received
        });

        let channel = TcpSignalingChannel::new();
        let (events, _rx) = mpsc::unbounded_channel();
        let endpoint = Endpoint::new("127.0.0.1", port).unwrap();
        channel
            .connect(&endpoint, Duration::from_secs(2), events.clone())
            .await
            .unwrap();
        assert!(matches!(
            channel
                .connect(&endpoint, Duration::from_secs(2), events)
                .await,
            Err(SignalingError::AlreadyConnected)
        ));

        channel.send(&Envelope::empty(MessageType::StopVideo, "session-1"));
        channel.disconnect().await;

        let received = tokio::time::timeout(Duration::from_secs(2), host)
            .await
            .unwrap()
            .unwrap();
        let lines: Vec<&str> = received.lines().collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(
            Envelope::decode(lines[0].as_bytes()).unwrap().message_type,
            MessageType::StopVideo
        );
    }
}
