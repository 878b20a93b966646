// Domain layer - session model, value objects, events
// No dependencies on other layers

pub mod aggregates;
pub mod events;
pub mod value_objects;

pub use aggregates::*;
pub use events::*;
pub use value_objects::*;
