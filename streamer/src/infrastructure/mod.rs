// Infrastructure layer - adapters for transports, the media engine and diagnostics

pub mod driven;
