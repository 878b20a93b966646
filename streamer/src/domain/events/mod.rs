pub mod domain_event;
pub mod session_event;

pub use domain_event::DomainEvent;
pub use session_event::SessionEvent;
