// Hand Tracking Streamer - video session orchestrator and telemetry tooling
//
// Architecture (hexagonal):
// - domain: session state machine, value objects, events
// - application: session orchestration and the ports it depends on
// - infrastructure: signaling transports, the WebRTC adapter, telemetry, diagnostics

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
