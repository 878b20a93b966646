//! Video session orchestration
//!
//! A single event loop owns the current session. Control calls, signaling
//! events, peer events and the completion of long-running operations are all
//! queued as commands and applied one at a time, so the session state is only
//! ever touched from that loop.

pub mod errors;
pub mod orchestrator;
pub mod status;
mod workers;


pub use errors::SessionError;
pub use orchestrator::{SessionDependencies, SessionOrchestrator};
pub use status::{SessionConfig, SessionStatus, StartSessionRequest};
