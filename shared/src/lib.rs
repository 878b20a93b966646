pub mod framing;
pub mod protocol;
pub mod telemetry;

pub use framing::{encode_frame, LineFramer, MAX_FRAME_LEN};
pub use protocol::{
    EmptyPayload, Envelope, ErrorPayload, HelloPayload, IceCandidatePayload, MessageType,
    ProtocolError, SdpPayload, StatsPayload, StopVideoPayload, VideoStatePayload,
};
pub use telemetry::{parse_line, Side, TelemetryLine, LANDMARK_COUNT};
