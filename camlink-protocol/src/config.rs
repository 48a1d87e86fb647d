use core::fmt::Write as _;

use crate::image_store::{ImageId, MAX_LISTED_IMAGES};
use crate::session::wav::AudioFormat;

/// Capacity of the chunk I/O buffers. A configured chunk size above this is clamped.
pub const MAX_CHUNK_SIZE: usize = 1024;

/// Capacity of the playback buffer used while streaming a response to the speaker.
pub const MAX_PLAYBACK_CHUNK: usize = 8 * 1024;

/// Capacity of one microphone read.
pub const MAX_MIC_READ: usize = 1024;

/// Wire-level limits and timeouts. Both nodes must agree on `chunk_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkConfig {
    pub chunk_size: usize,
    /// How long the chunk sender waits for an ACK before resending.
    pub ack_timeout_ms: u32,
    /// How long the master waits for a response frame.
    pub response_timeout_ms: u32,
    /// Deadline for a chunk header, and separately for its payload.
    pub chunk_timeout_ms: u32,
    pub checksum_timeout_ms: u32,
    /// Resends of a single chunk before the sender gives up. `None` retries forever.
    pub max_chunk_retries: Option<u32>,
    /// Consecutive rejected chunks before the receiver gives up. `None` never gives up.
    pub max_receive_failures: Option<u32>,
    /// Silence the receiver waits for after a rejected chunk before sending
    /// NACK. Must stay below `ack_timeout_ms` so the resend arrives aligned.
    pub resync_idle_ms: u32,
    pub max_image_size: usize,
}

impl LinkConfig {
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.clamp(1, MAX_CHUNK_SIZE)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            ack_timeout_ms: 1000,
            response_timeout_ms: 5000,
            chunk_timeout_ms: 5000,
            checksum_timeout_ms: 1000,
            max_chunk_retries: Some(3),
            max_receive_failures: Some(8),
            resync_idle_ms: 100,
            max_image_size: 512 * 1024,
        }
    }
}

/// Timing and buffer settings of the master's interaction loop.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionConfig {
    pub debounce_ms: f64,
    pub long_press_ms: f64,
    pub error_blinks: u32,
    pub blink_ms: u32,
    /// Pause after the error blink pattern before returning to idle.
    pub error_delay_ms: u32,
    pub poll_interval_ms: u32,
    pub mic_read_len: usize,
    pub playback_chunk: usize,
    pub audio_format: AudioFormat,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50.0,
            long_press_ms: 500.0,
            error_blinks: 5,
            blink_ms: 100,
            error_delay_ms: 1000,
            poll_interval_ms: 10,
            mic_read_len: MAX_MIC_READ,
            playback_chunk: MAX_PLAYBACK_CHUNK,
            audio_format: AudioFormat {
                sample_rate: 16_000,
                channels: 1,
                bits_per_sample: 16,
            },
        }
    }
}

/// Naming and retention of stored images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StoreConfig {
    pub max_images: usize,
    pub prefix: &'static str,
    pub extension: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreConfigError {
    /// `max_images` is zero or more than `list` can report.
    MaxImagesOutOfRange(usize),
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), StoreConfigError> {
        if (1..=MAX_LISTED_IMAGES).contains(&self.max_images) {
            Ok(())
        } else {
            Err(StoreConfigError::MaxImagesOutOfRange(self.max_images))
        }
    }

    /// `stamp` is zero padded so that name order is creation order.
    pub fn image_id(&self, stamp: u64) -> Result<ImageId, core::fmt::Error> {
        let mut id = ImageId::new();
        write!(id, "{}{:013}{}", self.prefix, stamp, self.extension)?;
        Ok(id)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_images: 10,
            prefix: "IMG_",
            extension: ".jpg",
        }
    }
}
