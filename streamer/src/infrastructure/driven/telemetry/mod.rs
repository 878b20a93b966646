// Telemetry side-channel tooling (host side)

pub mod hands;
pub mod listener;
pub mod stats;

pub use hands::{HandState, HandTracker};
pub use listener::{ListenMode, ListenerConfig, TelemetryListener, TelemetryProtocol, TelemetrySink};
pub use stats::{percentile, ArrivalReport, InterArrivalStats};
