use serde::{Deserialize, Serialize};

/// Per-session options passed through to collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Opaque preset identifier, forwarded to the host in `hello`
    pub preset: String,
    pub show_debug_stats: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            preset: "default".to_string(),
            show_debug_stats: false,
        }
    }
}
