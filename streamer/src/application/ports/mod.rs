// Application ports - driven ports implemented by infrastructure

pub mod observer;
pub mod peer_connection;
pub mod signaling_channel;

pub use observer::{DisconnectNotifier, SessionObserver};
pub use peer_connection::{
    CapabilityError, IceCandidate, PeerCapabilities, PeerConnectionAdapter,
    PeerConnectionFactory, PeerConnectionState, PeerError, PeerEvent, PeerEventSender,
    REQUIRED_PEER_API_VERSION,
};
pub use signaling_channel::{
    SignalingChannel, SignalingChannelFactory, SignalingError, SignalingEvent,
    SignalingEventSender,
};
