// Application layer - session orchestration use case
// Orchestrates domain logic, depends on domain layer and ports only

pub mod ports;
pub mod session;
