use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::application::ports::{
    IceCandidate, PeerCapabilities, PeerConnectionAdapter, PeerConnectionFactory,
    PeerConnectionState, PeerError, PeerEvent, PeerEventSender, REQUIRED_PEER_API_VERSION,
};

const TEST_PATTERN_FRAME: Duration = Duration::from_millis(33);

/// Settings shared by every adapter the factory creates
#[derive(Debug, Clone, Default)]
pub struct PeerSettings {
    /// STUN/TURN URLs; empty on a local network
    pub ice_servers: Vec<String>,
    /// Feed a synthetic H.264 stream instead of waiting for captured frames
    pub test_pattern: bool,
}

pub struct WebRtcPeerFactory {
    settings: PeerSettings,
}

impl WebRtcPeerFactory {
    pub fn new(settings: PeerSettings) -> Self {
        Self { settings }
    }
}

impl PeerConnectionFactory for WebRtcPeerFactory {
    fn create(&self) -> Arc<dyn PeerConnectionAdapter> {
        Arc::new(WebRtcPeerAdapter::new(self.settings.clone()))
    }
}

struct PeerState {
    connection: Arc<RTCPeerConnection>,
    track: Arc<TrackLocalStaticSample>,
    /// Remote candidates that arrived before the answer
    pending_candidates: Vec<RTCIceCandidateInit>,
    remote_applied: bool,
    cancel: CancellationToken,
}

/// Peer connection adapter backed by webrtc-rs, sending one H.264 video track
pub struct WebRtcPeerAdapter {
    settings: PeerSettings,
    state: Mutex<Option<PeerState>>,
}

impl WebRtcPeerAdapter {
    pub fn new(settings: PeerSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(None),
        }
    }

    /// Queue one encoded access unit on the outgoing video track
    pub async fn push_frame(&self, data: Bytes, duration: Duration) -> Result<(), PeerError> {
        let track = {
            let state = self.state.lock().await;
            state
                .as_ref()
                .map(|s| s.track.clone())
                .ok_or(PeerError::NotInitialized)?
        };
        write_frame(&track, data, duration).await
    }

    async fn build_connection(&self) -> Result<Arc<RTCPeerConnection>, PeerError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(engine_error)?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).map_err(engine_error)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: self
                .settings
                .ice_servers
                .iter()
                .map(|url| RTCIceServer {
                    urls: vec![url.clone()],
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let connection = api.new_peer_connection(config).await.map_err(engine_error)?;
        Ok(Arc::new(connection))
    }
}

#[async_trait]
impl PeerConnectionAdapter for WebRtcPeerAdapter {
    fn capabilities(&self) -> PeerCapabilities {
        PeerCapabilities {
            api_version: REQUIRED_PEER_API_VERSION,
            trickle_ice: true,
        }
    }

    async fn initialize(&self, events: PeerEventSender) -> Result<(), PeerError> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            return Err(PeerError::Engine(
                "peer connection already initialized".to_string(),
            ));
        }

        let connection = self.build_connection().await?;

        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_H264.to_owned(),
                clock_rate: 90000,
                channels: 0,
                sdp_fmtp_line: "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f"
                    .to_owned(),
                rtcp_feedback: vec![],
            },
            "video".to_owned(),
            "hts-streamer".to_owned(),
        ));
        let rtp_sender = connection
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(engine_error)?;

        let cancel = CancellationToken::new();

        // Drain RTCP so the interceptors keep running
        let rtcp_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut buffer = vec![0u8; 1500];
            loop {
                tokio::select! {
                    _ = rtcp_cancel.cancelled() => break,
                    read = rtp_sender.read(&mut buffer) => {
                        if read.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let candidate_events = events.clone();
        connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = candidate_events.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    debug!("Local ICE gathering complete");
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = events.send(PeerEvent::LocalCandidate(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                        }));
                    }
                    Err(e) => warn!("Failed to serialize local candidate: {}", e),
                }
            })
        }));

        let state_events = events.clone();
        connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                let events = state_events.clone();
                Box::pin(async move {
                    info!("Peer connection state changed: {}", state);
                    if let Some(state) = map_state(state) {
                        let _ = events.send(PeerEvent::ConnectionStateChanged(state));
                    }
                })
            },
        ));

        let media_announced = Arc::new(AtomicBool::new(false));
        let track_events = events;
        connection.on_track(Box::new(
            move |_track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let events = track_events.clone();
                let announced = media_announced.clone();
                Box::pin(async move {
                    info!("Remote track started");
                    if !announced.swap(true, Ordering::SeqCst) {
                        let _ = events.send(PeerEvent::RemoteMediaReady);
                    }
                })
            },
        ));

        if self.settings.test_pattern {
            tokio::spawn(send_test_pattern(track.clone(), cancel.clone()));
        }

        *state = Some(PeerState {
            connection,
            track,
            pending_candidates: Vec::new(),
            remote_applied: false,
            cancel,
        });
        info!("Peer connection initialized");
        Ok(())
    }

    async fn create_offer(&self) -> Result<String, PeerError> {
        let state = self.state.lock().await;
        let state = state.as_ref().ok_or(PeerError::NotInitialized)?;

        let offer = state
            .connection
            .create_offer(None)
            .await
            .map_err(negotiation_error)?;
        let sdp = offer.sdp.clone();
        state
            .connection
            .set_local_description(offer)
            .await
            .map_err(negotiation_error)?;

        debug!("Local offer created ({} bytes)", sdp.len());
        Ok(sdp)
    }

    async fn apply_answer(&self, sdp: &str) -> Result<(), PeerError> {
        let mut state = self.state.lock().await;
        let state = state.as_mut().ok_or(PeerError::NotInitialized)?;

        let answer = RTCSessionDescription::answer(sdp.to_string()).map_err(negotiation_error)?;
        state
            .connection
            .set_remote_description(answer)
            .await
            .map_err(negotiation_error)?;
        state.remote_applied = true;
        info!("Remote answer applied");

        for candidate in std::mem::take(&mut state.pending_candidates) {
            if let Err(e) = state.connection.add_ice_candidate(candidate).await {
                warn!("Failed to apply queued remote candidate: {}", e);
            }
        }
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError> {
        let mut state = self.state.lock().await;
        let state = state.as_mut().ok_or(PeerError::NotInitialized)?;

        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        };
        if !state.remote_applied {
            debug!("Queueing remote candidate until the answer is applied");
            state.pending_candidates.push(init);
            return Ok(());
        }

        state
            .connection
            .add_ice_candidate(init)
            .await
            .map_err(negotiation_error)
    }

    async fn close(&self) {
        let Some(state) = self.state.lock().await.take() else {
            return;
        };
        state.cancel.cancel();
        if let Err(e) = state.connection.close().await {
            warn!("Failed to close peer connection: {}", e);
        }
        info!("Peer connection closed");
    }
}

fn map_state(state: RTCPeerConnectionState) -> Option<PeerConnectionState> {
    match state {
        RTCPeerConnectionState::New => Some(PeerConnectionState::New),
        RTCPeerConnectionState::Connecting => Some(PeerConnectionState::Connecting),
        RTCPeerConnectionState::Connected => Some(PeerConnectionState::Connected),
        RTCPeerConnectionState::Disconnected => Some(PeerConnectionState::Disconnected),
        RTCPeerConnectionState::Failed => Some(PeerConnectionState::Failed),
        RTCPeerConnectionState::Closed => Some(PeerConnectionState::Closed),
        _ => None,
    }
}

fn engine_error(e: webrtc::Error) -> PeerError {
    PeerError::Engine(e.to_string())
}

fn negotiation_error(e: webrtc::Error) -> PeerError {
    PeerError::Negotiation(e.to_string())
}

async fn write_frame(
    track: &TrackLocalStaticSample,
    data: Bytes,
    duration: Duration,
) -> Result<(), PeerError> {
    track
        .write_sample(&Sample {
            data,
            duration,
            ..Default::default()
        })
        .await
        .map_err(engine_error)
}

/// Synthetic stream: an IDR-typed NAL unit whose body shifts over time
async fn send_test_pattern(track: Arc<TrackLocalStaticSample>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(TEST_PATTERN_FRAME);
    let mut frame: u64 = 0;

    info!("Starting test pattern video stream");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let shade: u8 = match (frame / 100) % 3 {
            0 => 0x80,
            1 => 0xA0,
            _ => 0x60,
        };
        let mut nal = vec![0x00, 0x00, 0x00, 0x01, 0x65];
        nal.extend((0..100u8).map(|i| shade.wrapping_add(i)));

        if let Err(e) = write_frame(&track, Bytes::from(nal), TEST_PATTERN_FRAME).await {
            warn!("Test pattern stopped: {}", e);
            break;
        }

        frame += 1;
        if frame % 300 == 0 {
            debug!("Sent {} test pattern frames", frame);
        }
    }
}
