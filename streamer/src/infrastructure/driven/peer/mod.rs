// Peer connection adapters

pub mod webrtc_adapter;

pub use webrtc_adapter::{PeerSettings, WebRtcPeerAdapter, WebRtcPeerFactory};
