use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::errors::SessionError;
use super::status::StartSessionRequest;
use crate::application::ports::{
    IceCandidate, PeerConnectionAdapter, PeerError, PeerEvent, PeerEventSender, SignalingChannel,
    SignalingError, SignalingEvent, SignalingEventSender,
};
use crate::domain::{Endpoint, SessionId};

/// Everything the session loop reacts to
pub(super) enum Command {
    Start {
        request: StartSessionRequest,
        reply: oneshot::Sender<Result<SessionId, SessionError>>,
    },
    Stop {
        reason: Option<String>,
        reply: oneshot::Sender<bool>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
    Signaling {
        session_id: SessionId,
        event: SignalingEvent,
    },
    Peer {
        session_id: SessionId,
        event: PeerEvent,
    },
    ConnectFinished {
        session_id: SessionId,
        channel: Arc<dyn SignalingChannel>,
        result: Result<(), SignalingError>,
    },
    Adapter {
        session_id: SessionId,
        outcome: AdapterOutcome,
    },
}

pub(super) enum AdapterOp {
    CreateOffer,
    ApplyAnswer(String),
    AddCandidate(IceCandidate),
}

pub(super) enum AdapterOutcome {
    OfferCreated(Result<String, PeerError>),
    AnswerApplied(Result<(), PeerError>),
    CandidateAdded(Result<(), PeerError>),
}

/// Re-queue a session's signaling events onto the loop, tagged with its id
pub(super) fn forward_signaling(
    session_id: SessionId,
    events: mpsc::UnboundedReceiver<SignalingEvent>,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
) {
    forward(events, commands, cancel, move |event| Command::Signaling {
        session_id: session_id.clone(),
        event,
    });
}

pub(super) fn forward_peer(
    session_id: SessionId,
    events: mpsc::UnboundedReceiver<PeerEvent>,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
) {
    forward(events, commands, cancel, move |event| Command::Peer {
        session_id: session_id.clone(),
        event,
    });
}

fn forward<E, F>(
    mut events: mpsc::UnboundedReceiver<E>,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    wrap: F,
) where
    E: Send + 'static,
    F: Fn(E) -> Command + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            if commands.send(wrap(event)).is_err() {
                break;
            }
        }
    });
}

/// Open the signaling channel off the loop and report back how it went.
/// A connect that outlives its session is closed again right away.
pub(super) fn spawn_connect(
    session_id: SessionId,
    channel: Arc<dyn SignalingChannel>,
    endpoint: Endpoint,
    timeout: Duration,
    events: SignalingEventSender,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let attempt = tokio::time::timeout(timeout, channel.connect(&endpoint, timeout, events));
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Connect for session {} cancelled", session_id);
                channel.disconnect().await;
                return;
            }
            attempt = attempt => match attempt {
                Ok(result) => result,
                Err(_) => {
                    channel.disconnect().await;
                    Err(SignalingError::Timeout {
                        endpoint: endpoint.to_string(),
                        timeout,
                    })
                }
            },
        };

        if let Err(returned) = commands.send(Command::ConnectFinished {
            session_id,
            channel,
            result,
        }) {
            if let Command::ConnectFinished { channel, .. } = returned.0 {
                channel.disconnect().await;
            }
        }
    });
}

/// Runs adapter operations strictly one after another, so negotiation steps
/// are applied in the order the loop issued them
pub(super) fn spawn_adapter_worker(
    session_id: SessionId,
    adapter: Arc<dyn PeerConnectionAdapter>,
    mut ops: mpsc::UnboundedReceiver<AdapterOp>,
    peer_events: PeerEventSender,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            let op = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                op = ops.recv() => match op {
                    Some(op) => op,
                    None => break,
                },
            };

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = execute(adapter.as_ref(), op, &peer_events) => outcome,
            };

            if commands
                .send(Command::Adapter {
                    session_id: session_id.clone(),
                    outcome,
                })
                .is_err()
            {
                break;
            }
        }
        debug!("Adapter worker for session {} ended", session_id);
    });
}

async fn execute(
    adapter: &dyn PeerConnectionAdapter,
    op: AdapterOp,
    peer_events: &PeerEventSender,
) -> AdapterOutcome {
    match op {
        AdapterOp::CreateOffer => {
            AdapterOutcome::OfferCreated(create_offer(adapter, peer_events.clone()).await)
        }
        AdapterOp::ApplyAnswer(sdp) => AdapterOutcome::AnswerApplied(adapter.apply_answer(&sdp).await),
        AdapterOp::AddCandidate(candidate) => {
            AdapterOutcome::CandidateAdded(adapter.add_remote_candidate(candidate).await)
        }
    }
}

async fn create_offer(
    adapter: &dyn PeerConnectionAdapter,
    peer_events: PeerEventSender,
) -> Result<String, PeerError> {
    adapter.capabilities().negotiate()?;
    adapter.initialize(peer_events).await?;
    adapter.create_offer().await
}
