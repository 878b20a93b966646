// Driven adapters - implementations of the application ports

pub mod notifier;
pub mod observer;
pub mod peer;
pub mod signaling;
pub mod telemetry;

pub use notifier::{ChannelDisconnectNotifier, Disconnection};
pub use observer::TracingSessionObserver;
