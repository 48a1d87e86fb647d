pub const WAV_HEADER_LEN: usize = 44;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    pub fn block_align(&self) -> u16 {
        self.channels * self.bits_per_sample / 8
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }
}

/// Canonical 44 byte PCM header for `data_len` bytes of samples.
pub fn wav_header(data_len: u32, format: &AudioFormat) -> [u8; WAV_HEADER_LEN] {
    let mut header = [0u8; WAV_HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(data_len + 36).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&format.channels.to_le_bytes());
    header[24..28].copy_from_slice(&format.sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&format.byte_rate().to_le_bytes());
    header[32..34].copy_from_slice(&format.block_align().to_le_bytes());
    header[34..36].copy_from_slice(&format.bits_per_sample.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_len.to_le_bytes());
    header
}

/// Drops the first [`WAV_HEADER_LEN`] bytes of a stream, however it is split
/// into reads.
pub struct HeaderSkipper {
    remaining: usize,
}

impl HeaderSkipper {
    pub fn new() -> Self {
        Self {
            remaining: WAV_HEADER_LEN,
        }
    }

    pub fn skip<'a>(&mut self, data: &'a [u8]) -> &'a [u8] {
        let skipped = self.remaining.min(data.len());
        self.remaining -= skipped;
        &data[skipped..]
    }
}

impl Default for HeaderSkipper {
    fn default() -> Self {
        Self::new()
    }
}
