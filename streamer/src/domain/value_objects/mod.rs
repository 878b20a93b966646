pub mod endpoint;
pub mod session_id;
pub mod session_options;

pub use endpoint::Endpoint;
pub use session_id::SessionId;
pub use session_options::SessionOptions;
