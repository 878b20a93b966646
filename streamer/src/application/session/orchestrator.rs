use serde::Serialize;
use shared::{
    EmptyPayload, Envelope, ErrorPayload, HelloPayload, IceCandidatePayload, MessageType,
    SdpPayload, StatsPayload, StopVideoPayload, VideoStatePayload,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::errors::SessionError;
use super::status::{SessionConfig, SessionStatus, StartSessionRequest};
use super::workers::{self, AdapterOp, AdapterOutcome, Command};
use crate::application::ports::{
    DisconnectNotifier, IceCandidate, PeerConnectionAdapter, PeerConnectionFactory,
    PeerConnectionState, PeerEvent, SessionObserver, SignalingChannel, SignalingChannelFactory,
    SignalingError, SignalingEvent,
};
use crate::domain::{
    DomainEvent, Endpoint, SessionEvent, SessionId, SessionState, TransitionError, VideoSession,
};

/// Collaborators handed to the orchestrator at construction
pub struct SessionDependencies {
    pub config: SessionConfig,
    pub signaling: Arc<dyn SignalingChannelFactory>,
    pub peers: Arc<dyn PeerConnectionFactory>,
    pub notifier: Arc<dyn DisconnectNotifier>,
    pub observer: Option<Arc<dyn SessionObserver>>,
}

/// Handle to the session event loop.
///
/// Cheap calls only enqueue a command; the loop applies them in order.
/// Dropping the handle shuts the loop down and tears down any live session.
pub struct SessionOrchestrator {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SessionStatus>,
    task: Option<JoinHandle<()>>,
}

impl SessionOrchestrator {
    /// Start the event loop on the current runtime
    pub fn spawn(dependencies: SessionDependencies) -> Self {
        let (commands, inbox) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(SessionStatus::default());

        let event_loop = SessionLoop {
            config: dependencies.config,
            signaling: dependencies.signaling,
            peers: dependencies.peers,
            notifier: dependencies.notifier,
            sink: StatusSink {
                status: status_tx,
                observer: dependencies.observer,
                sequence: AtomicU64::new(0),
            },
            commands: commands.clone(),
            active: None,
            tearing_down: AtomicBool::new(false),
        };
        let task = tokio::spawn(event_loop.run(inbox));

        Self {
            commands,
            status,
            task: Some(task),
        }
    }

    /// Begin a new session. Returns once the signaling connect is under way;
    /// a failed connect is reported through the status and the disconnect notifier.
    pub async fn start_session(
        &self,
        request: StartSessionRequest,
    ) -> Result<SessionId, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Start { request, reply })
            .map_err(|_| SessionError::OrchestratorClosed)?;
        response.await.map_err(|_| SessionError::OrchestratorClosed)?
    }

    /// Stop the current session, if any. Returns whether a teardown ran.
    pub async fn stop_session(&self, reason: Option<String>) -> Result<bool, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Stop { reason, reply })
            .map_err(|_| SessionError::OrchestratorClosed)?;
        response.await.map_err(|_| SessionError::OrchestratorClosed)
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Tear down any live session and wait for the loop to exit
    pub async fn shutdown(mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).is_ok() {
            let _ = done.await;
        }
        if let Err(e) = task.await {
            error!("Session loop ended abnormally: {}", e);
        }
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        if self.task.is_some() {
            let (reply, _) = oneshot::channel();
            let _ = self.commands.send(Command::Shutdown { reply });
        }
    }
}

/// Status publication and diagnostics, kept apart from the session so both
/// can be borrowed at once
struct StatusSink {
    status: watch::Sender<SessionStatus>,
    observer: Option<Arc<dyn SessionObserver>>,
    /// Last sequence number handed to the observer
    sequence: AtomicU64,
}

impl StatusSink {
    fn emit(&self, event: SessionEvent) {
        if let Some(observer) = &self.observer {
            let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
            observer.on_event(&DomainEvent::new(sequence, event));
        }
    }

    fn advance(
        &self,
        session: &mut VideoSession,
        step: fn(&mut VideoSession) -> Result<(), TransitionError>,
    ) -> Result<(), TransitionError> {
        let from = session.state();
        step(session)?;
        let to = session.state();

        info!("Session {}: {} -> {}", session.id, from, to);
        self.status.send_modify(|status| status.state = to);
        self.emit(SessionEvent::StateChanged {
            session_id: session.id.clone(),
            from,
            to,
        });
        Ok(())
    }
}

/// Everything owned by one streaming attempt
struct ActiveSession {
    session: VideoSession,
    channel: Arc<dyn SignalingChannel>,
    adapter: Arc<dyn PeerConnectionAdapter>,
    adapter_ops: mpsc::UnboundedSender<AdapterOp>,
    cancel: CancellationToken,
    /// Local candidates gathered before the offer went out
    pending_local_candidates: Vec<IceCandidate>,
    answer_pending: bool,
    /// Media announced before the answer was applied
    media_ready: bool,
}

impl ActiveSession {
    fn send<P: Serialize>(&self, sink: &StatusSink, message_type: MessageType, payload: &P) {
        let envelope = match Envelope::new(message_type, self.session.id.as_str(), payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Failed to build outbound message: {}", e);
                return;
            }
        };
        debug!("Session {} sending {}", self.session.id, envelope.message_type);
        self.channel.send(&envelope);
        sink.emit(SessionEvent::EnvelopeSent {
            session_id: self.session.id.clone(),
            message_type: envelope.message_type,
        });
    }

    fn send_candidate(&self, sink: &StatusSink, candidate: IceCandidate) {
        self.send(
            sink,
            MessageType::IceCandidate,
            &IceCandidatePayload::from(candidate),
        );
    }

    fn submit(&self, op: AdapterOp) {
        if self.adapter_ops.send(op).is_err() {
            warn!("Adapter worker for session {} is gone", self.session.id);
        }
    }
}

struct SessionLoop {
    config: SessionConfig,
    signaling: Arc<dyn SignalingChannelFactory>,
    peers: Arc<dyn PeerConnectionFactory>,
    notifier: Arc<dyn DisconnectNotifier>,
    sink: StatusSink,
    commands: mpsc::UnboundedSender<Command>,
    active: Option<ActiveSession>,
    /// Set before any teardown work runs, cleared on the next start
    tearing_down: AtomicBool,
}

impl SessionLoop {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Command>) {
        info!("Session orchestrator started");

        while let Some(command) = inbox.recv().await {
            match command {
                Command::Start { request, reply } => {
                    let _ = reply.send(self.start(request));
                }
                Command::Stop { reason, reply } => {
                    let reason = reason.unwrap_or_else(|| "stopped by user".to_string());
                    let _ = reply.send(self.teardown(&reason, false).await);
                }
                Command::Shutdown { reply } => {
                    self.teardown("orchestrator shutdown", false).await;
                    let _ = reply.send(());
                    break;
                }
                Command::Signaling { session_id, event } => {
                    if self.is_current(&session_id) {
                        self.on_signaling(event).await;
                    }
                }
                Command::Peer { session_id, event } => {
                    if self.is_current(&session_id) {
                        self.on_peer(event).await;
                    }
                }
                Command::ConnectFinished {
                    session_id,
                    channel,
                    result,
                } => self.on_connect_finished(session_id, channel, result).await,
                Command::Adapter {
                    session_id,
                    outcome,
                } => {
                    if self.is_current(&session_id) {
                        self.on_adapter(outcome).await;
                    }
                }
            }
        }

        info!("Session orchestrator stopped");
    }

    fn is_current(&self, session_id: &SessionId) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| &active.session.id == session_id)
    }

    fn start(&mut self, request: StartSessionRequest) -> Result<SessionId, SessionError> {
        if let Some(active) = &self.active {
            return Err(SessionError::AlreadyActive(active.session.state()));
        }

        let endpoint =
            Endpoint::new(request.host, request.port).map_err(SessionError::InvalidRequest)?;
        let mut session = VideoSession::new(endpoint, request.options);
        let session_id = session.id.clone();

        self.tearing_down.store(false, Ordering::SeqCst);
        self.sink.status.send_modify(|status| {
            status.session_id = Some(session_id.clone());
            status.last_error = None;
            status.last_stats = None;
        });
        self.sink
            .advance(&mut session, VideoSession::begin_connecting)
            .map_err(|e| SessionError::InvalidRequest(e.to_string()))?;

        let cancel = CancellationToken::new();
        let channel = self.signaling.create();
        let adapter = self.peers.create();
        let (signaling_tx, signaling_rx) = mpsc::unbounded_channel::<SignalingEvent>();
        let (peer_tx, peer_rx) = mpsc::unbounded_channel::<PeerEvent>();
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();

        workers::forward_signaling(
            session_id.clone(),
            signaling_rx,
            self.commands.clone(),
            cancel.clone(),
        );
        workers::forward_peer(
            session_id.clone(),
            peer_rx,
            self.commands.clone(),
            cancel.clone(),
        );
        workers::spawn_adapter_worker(
            session_id.clone(),
            adapter.clone(),
            ops_rx,
            peer_tx,
            self.commands.clone(),
            cancel.clone(),
        );
        info!(
            "Connecting session {} to {} (preset: {})",
            session_id, session.endpoint, session.options.preset
        );
        workers::spawn_connect(
            session_id.clone(),
            channel.clone(),
            session.endpoint.clone(),
            self.config.connect_timeout,
            signaling_tx,
            self.commands.clone(),
            cancel.clone(),
        );

        self.active = Some(ActiveSession {
            session,
            channel,
            adapter,
            adapter_ops: ops_tx,
            cancel,
            pending_local_candidates: Vec::new(),
            answer_pending: false,
            media_ready: false,
        });
        Ok(session_id)
    }

    async fn on_connect_finished(
        &mut self,
        session_id: SessionId,
        channel: Arc<dyn SignalingChannel>,
        result: Result<(), SignalingError>,
    ) {
        let waiting = self.active.as_ref().is_some_and(|active| {
            active.session.id == session_id
                && active.session.state() == SessionState::SignalingConnecting
        });
        if !waiting {
            if result.is_ok() {
                debug!("Closing signaling channel of superseded session {}", session_id);
                tokio::spawn(async move { channel.disconnect().await });
            }
            return;
        }

        if let Err(e) = result {
            self.fail(SessionError::ConnectFailed(e.to_string())).await;
            return;
        }

        let Some(active) = self.active.as_ref() else {
            return;
        };
        info!("Signaling connected for session {}", session_id);
        let hello = HelloPayload {
            app_version: self.config.app_version.clone(),
            video_preset: active.session.options.preset.clone(),
            client_name: self.config.client_name.clone(),
        };
        active.send(&self.sink, MessageType::Hello, &hello);
        active.send(&self.sink, MessageType::StartVideo, &EmptyPayload {});
        active.submit(AdapterOp::CreateOffer);
    }

    async fn on_signaling(&mut self, event: SignalingEvent) {
        match event {
            SignalingEvent::Connected => debug!("Signaling channel reports connected"),
            SignalingEvent::Envelope(envelope) => self.on_envelope(envelope).await,
            SignalingEvent::Disconnected(reason) => {
                self.fail(SessionError::TransportDropped(reason)).await
            }
            SignalingEvent::Error(message) => warn!("Signaling channel error: {}", message),
        }
    }

    async fn on_envelope(&mut self, envelope: Envelope) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        if !active.session.id.matches(&envelope.session_id) {
            debug!(
                "Dropping {} for stale session '{}'",
                envelope.message_type, envelope.session_id
            );
            self.sink.emit(SessionEvent::EnvelopeDropped {
                message_type: envelope.message_type,
                session_id: envelope.session_id,
            });
            return;
        }

        let session_id = active.session.id.clone();
        let show_stats = active.session.options.show_debug_stats;
        self.sink.emit(SessionEvent::EnvelopeReceived {
            session_id: session_id.clone(),
            message_type: envelope.message_type.clone(),
        });

        match &envelope.message_type {
            MessageType::Answer => self.on_answer(&envelope).await,
            MessageType::IceCandidate => self.on_remote_candidate(&envelope).await,
            MessageType::Error => {
                let message = envelope
                    .payload_as::<ErrorPayload>()
                    .map(|payload| payload.message)
                    .unwrap_or_default();
                let message = if message.is_empty() {
                    "unspecified".to_string()
                } else {
                    message
                };
                self.fail(SessionError::HostError(message)).await;
            }
            MessageType::Stats => match envelope.payload_as::<StatsPayload>() {
                Ok(stats) => {
                    if show_stats {
                        info!(
                            "Stats: {:.1} fps, {:.0} kbps, {} drops, {:.0} ms rtt",
                            stats.fps, stats.bitrate_kbps, stats.frame_drops, stats.rtt_ms
                        );
                    }
                    self.sink
                        .status
                        .send_modify(|status| status.last_stats = Some(stats.clone()));
                    self.sink
                        .emit(SessionEvent::StatsUpdated { session_id, stats });
                }
                Err(e) => warn!("Ignoring stats: {}", e),
            },
            MessageType::VideoState => match envelope.payload_as::<VideoStatePayload>() {
                Ok(payload) => {
                    info!(
                        "Host video state: {} ({})",
                        payload.state,
                        payload.reason.as_deref().unwrap_or("-")
                    );
                    self.sink.emit(SessionEvent::HostVideoState {
                        session_id,
                        state: payload.state,
                        reason: payload.reason,
                    });
                }
                Err(e) => warn!("Ignoring video_state: {}", e),
            },
            MessageType::Unknown(tag) => debug!("Ignoring unknown message type '{}'", tag),
            other if other.is_informational() => debug!("Ignoring {}", other),
            other => warn!("Ignoring {} sent by the host, it only flows the other way", other),
        }
    }

    async fn on_answer(&mut self, envelope: &Envelope) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        if active.session.state() != SessionState::OfferSent || active.answer_pending {
            debug!("Ignoring answer in state {}", active.session.state());
            return;
        }

        let sdp = match envelope.payload_as::<SdpPayload>() {
            Ok(payload) if !payload.sdp.trim().is_empty() => payload.sdp,
            Ok(_) => {
                self.fail(SessionError::Protocol("answer has an empty sdp".to_string()))
                    .await;
                return;
            }
            Err(e) => {
                self.fail(SessionError::Protocol(e.to_string())).await;
                return;
            }
        };

        if let Some(active) = self.active.as_mut() {
            active.answer_pending = true;
            active.submit(AdapterOp::ApplyAnswer(sdp));
        }
    }

    async fn on_remote_candidate(&mut self, envelope: &Envelope) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        if !active.session.state().accepts_candidates() {
            debug!(
                "Ignoring remote candidate in state {}",
                active.session.state()
            );
            return;
        }

        let payload = match envelope.payload_as::<IceCandidatePayload>() {
            Ok(payload) => payload,
            Err(e) => {
                self.fail(SessionError::Protocol(e.to_string())).await;
                return;
            }
        };
        if payload.candidate.is_empty() {
            debug!("Remote end of candidates");
            return;
        }
        active.submit(AdapterOp::AddCandidate(payload.into()));
    }

    async fn on_peer(&mut self, event: PeerEvent) {
        let Some(active) = self.active.as_mut() else {
            return;
        };

        match event {
            PeerEvent::LocalCandidate(candidate) => match active.session.state() {
                SessionState::SignalingConnecting => {
                    active.pending_local_candidates.push(candidate)
                }
                state if state.accepts_candidates() => {
                    active.send_candidate(&self.sink, candidate)
                }
                state => debug!("Dropping local candidate in state {}", state),
            },
            PeerEvent::ConnectionStateChanged(state) => match state {
                PeerConnectionState::Failed => {
                    self.fail(SessionError::Adapter("peer connection failed".to_string()))
                        .await
                }
                PeerConnectionState::Closed => {
                    self.fail(SessionError::Adapter("peer connection closed".to_string()))
                        .await
                }
                PeerConnectionState::Disconnected => {
                    warn!("Peer connection disconnected, waiting for it to recover")
                }
                other => debug!("Peer connection state: {:?}", other),
            },
            PeerEvent::RemoteMediaReady => match active.session.state() {
                SessionState::Connected => self.enter_playing().await,
                SessionState::Playing => {}
                _ => active.media_ready = true,
            },
            PeerEvent::Error(message) => self.fail(SessionError::Adapter(message)).await,
        }
    }

    async fn on_adapter(&mut self, outcome: AdapterOutcome) {
        match outcome {
            AdapterOutcome::OfferCreated(Ok(sdp)) => self.on_offer_created(sdp).await,
            AdapterOutcome::OfferCreated(Err(e)) | AdapterOutcome::AnswerApplied(Err(e)) => {
                self.fail(SessionError::Adapter(e.to_string())).await
            }
            AdapterOutcome::AnswerApplied(Ok(())) => self.on_answer_applied().await,
            AdapterOutcome::CandidateAdded(Ok(())) => {}
            AdapterOutcome::CandidateAdded(Err(e)) => {
                warn!("Failed to add remote candidate: {}", e)
            }
        }
    }

    async fn on_offer_created(&mut self, sdp: String) {
        if sdp.trim().is_empty() {
            self.fail(SessionError::Protocol("local offer is empty".to_string()))
                .await;
            return;
        }
        if !has_video_section(&sdp) {
            self.fail(SessionError::Protocol(
                "local offer has no video section".to_string(),
            ))
            .await;
            return;
        }

        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.send(&self.sink, MessageType::Offer, &SdpPayload { sdp });
        if let Err(e) = self
            .sink
            .advance(&mut active.session, VideoSession::mark_offer_sent)
        {
            self.fail(SessionError::Protocol(e.to_string())).await;
            return;
        }

        for candidate in std::mem::take(&mut active.pending_local_candidates) {
            active.send_candidate(&self.sink, candidate);
        }
    }

    async fn on_answer_applied(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.answer_pending = false;
        if let Err(e) = self
            .sink
            .advance(&mut active.session, VideoSession::mark_connected)
        {
            self.fail(SessionError::Protocol(e.to_string())).await;
            return;
        }
        if active.media_ready {
            self.enter_playing().await;
        }
    }

    async fn enter_playing(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        match self
            .sink
            .advance(&mut active.session, VideoSession::mark_playing)
        {
            Ok(()) => self.sink.emit(SessionEvent::MediaReady {
                session_id: active.session.id.clone(),
            }),
            Err(e) => self.fail(SessionError::Protocol(e.to_string())).await,
        }
    }

    /// Record a fatal reason, tear down, then tell the enclosing application
    async fn fail(&mut self, error: SessionError) {
        let Some(session_id) = self.active.as_ref().map(|active| active.session.id.clone()) else {
            return;
        };
        let reason = error.to_string();
        error!("Session {} failed: {}", session_id, reason);

        self.sink
            .status
            .send_modify(|status| status.last_error = Some(reason.clone()));
        if self.teardown(&reason, true).await {
            self.notifier.on_disconnected(&session_id, &reason);
        }
    }

    /// Release the channel and the adapter and return to Idle.
    /// Runs at most once per session; returns whether it did anything.
    async fn teardown(&mut self, reason: &str, fatal: bool) -> bool {
        if self.tearing_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        let Some(mut active) = self.active.take() else {
            return false;
        };
        let session_id = active.session.id.clone();
        info!("Tearing down session {}: {}", session_id, reason);

        if let Err(e) = self
            .sink
            .advance(&mut active.session, VideoSession::begin_stopping)
        {
            warn!("{}", e);
        }
        if active.channel.is_connected() {
            active.send(
                &self.sink,
                MessageType::StopVideo,
                &StopVideoPayload {
                    reason: reason.to_string(),
                },
            );
        }
        active.cancel.cancel();

        let limit = self.config.teardown_timeout;
        if timeout(limit, active.adapter.close()).await.is_err() {
            warn!("Peer connection close timed out after {:?}", limit);
        }
        if timeout(limit, active.channel.disconnect()).await.is_err() {
            warn!("Signaling disconnect timed out after {:?}", limit);
        }

        if let Err(e) = self
            .sink
            .advance(&mut active.session, VideoSession::finish_stopping)
        {
            warn!("{}", e);
        }
        self.sink
            .status
            .send_modify(|status| status.session_id = None);
        self.sink.emit(SessionEvent::Stopped {
            session_id,
            reason: reason.to_string(),
            fatal,
        });
        true
    }
}

fn has_video_section(sdp: &str) -> bool {
    sdp.lines().any(|line| line.trim_start().starts_with("m=video"))
}
