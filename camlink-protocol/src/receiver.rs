use heapless::Vec;

use crate::codec::{decode_frame, DecodeError, Frame, FRAME_OVERHEAD, MAX_FRAME_LEN, START_BYTE};
use crate::utils::DebugBytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// The whole accumulated frame was dropped.
    Corrupted(DecodeError),
    /// More bytes arrived than any frame can hold.
    Overflow,
}

/// Rebuilds frames from an arbitrary byte stream.
///
/// Bytes are dropped until a start byte shows up. A frame that fails its
/// checksum is dropped as a whole; no attempt is made to find a later start
/// byte inside it.
pub struct FrameReceiver {
    buffer: Vec<u8, MAX_FRAME_LEN>,
}

impl FrameReceiver {
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// True when no partial frame is buffered.
    pub fn is_idle(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn push(&mut self, byte: u8) -> Result<Option<Frame>, FrameError> {
        if self.buffer.is_empty() && byte != START_BYTE {
            return Ok(None);
        }

        if self.buffer.push(byte).is_err() {
            self.buffer.clear();
            return Err(FrameError::Overflow);
        }

        if self.buffer.len() < FRAME_OVERHEAD {
            return Ok(None);
        }
        let payload_len = self.buffer[2] as usize;
        if self.buffer.len() < FRAME_OVERHEAD + payload_len {
            return Ok(None);
        }

        let result = decode_frame(&self.buffer);
        if result.is_err() {
            log_trace!("Dropping frame {:?}", DebugBytes(&self.buffer));
        }
        self.buffer.clear();
        result.map(Some).map_err(FrameError::Corrupted)
    }

    /// Feeds bytes until a frame completes. Returns how many bytes were consumed
    /// and the frame, if any. Errors are logged and skipped.
    pub fn feed(&mut self, bytes: &[u8]) -> (usize, Option<Frame>) {
        for (i, byte) in bytes.iter().enumerate() {
            match self.push(*byte) {
                Ok(Some(frame)) => return (i + 1, Some(frame)),
                Ok(None) => {}
                Err(e) => {
                    log_warn!("Error decoding frame: {:?}", e);
                }
            }
        }
        (bytes.len(), None)
    }
}

impl Default for FrameReceiver {
    fn default() -> Self {
        Self::new()
    }
}
