pub mod video_session;

pub use video_session::{SessionState, TransitionError, VideoSession};
