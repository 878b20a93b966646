use crate::protocol::ProtocolError;

/// Largest accepted newline-delimited frame (1 MiB)
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Splits a raw byte stream into newline-terminated frames.
///
/// Used wherever a transport is a plain byte stream (TCP signaling, TCP
/// telemetry). Bytes are buffered until a `\n` arrives; a trailing `\r` is
/// stripped and blank lines are skipped. A frame longer than the limit yields
/// one `FrameTooLarge` error and the rest of it is discarded up to the next
/// newline, after which framing resumes normally.
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_frame_len: usize,
    discarding: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_max_frame_len(MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_len,
            discarding: false,
        }
    }

    /// Feed bytes, returning every frame completed by them in arrival order
    pub fn push(&mut self, data: &[u8]) -> Vec<Result<Vec<u8>, ProtocolError>> {
        let mut frames = Vec::new();
        let mut rest = data;

        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            rest = &tail[1..];

            if self.discarding {
                self.discarding = false;
                self.buffer.clear();
                continue;
            }

            self.buffer.extend_from_slice(head);
            if self.buffer.len() > self.max_frame_len {
                frames.push(Err(ProtocolError::FrameTooLarge(self.buffer.len())));
                self.buffer.clear();
                continue;
            }

            let mut frame = std::mem::take(&mut self.buffer);
            if frame.last() == Some(&b'\r') {
                frame.pop();
            }
            if frame.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            frames.push(Ok(frame));
        }

        if !self.discarding {
            self.buffer.extend_from_slice(rest);
            if self.buffer.len() > self.max_frame_len {
                frames.push(Err(ProtocolError::FrameTooLarge(self.buffer.len())));
                self.buffer.clear();
                self.discarding = true;
            }
        }

        frames
    }

    /// Bytes buffered for an incomplete frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Terminate an encoded message for a newline-delimited transport
pub fn encode_frame(mut message: Vec<u8>) -> Vec<u8> {
    message.push(b'\n');
    message
}
