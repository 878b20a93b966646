use crate::domain::{DomainEvent, SessionEvent, SessionId};

/// Diagnostics sink. Must return quickly and never block the caller.
pub trait SessionObserver: Send + Sync {
    fn on_event(&self, event: &DomainEvent<SessionEvent>);
}

/// Enclosing application, told when a session ends on a fatal error
#[cfg_attr(test, mockall::automock)]
pub trait DisconnectNotifier: Send + Sync {
    fn on_disconnected(&self, session_id: &SessionId, reason: &str);
}
