use crate::checksum::chunk_checksum;
use crate::codec::{EncodeError, START_BYTE};

pub const ACK: u8 = 0x06;
pub const NACK: u8 = 0x15;

pub const CHUNK_HEADER_LEN: usize = 7;
/// Header, payload and trailing checksum byte.
pub const CHUNK_OVERHEAD: usize = CHUNK_HEADER_LEN + 1;

/// `[START][idx_hi][idx_lo][total_hi][total_lo][size_hi][size_lo]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChunkHeader {
    pub index: u16,
    pub total: u16,
    pub size: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChunkError {
    MissingStartByte,
    /// Index past the end of the transfer, or a transfer of zero chunks.
    InvalidIndex { index: u16, total: u16 },
    LengthDoesNotMatch,
    ChecksumDoesNotMatch { expected: u8, actual: u8 },
}

impl ChunkHeader {
    pub fn to_bytes(&self) -> [u8; CHUNK_HEADER_LEN] {
        let index = self.index.to_be_bytes();
        let total = self.total.to_be_bytes();
        let size = self.size.to_be_bytes();
        [
            START_BYTE, index[0], index[1], total[0], total[1], size[0], size[1],
        ]
    }

    pub fn from_bytes(bytes: &[u8; CHUNK_HEADER_LEN]) -> Result<Self, ChunkError> {
        if bytes[0] != START_BYTE {
            return Err(ChunkError::MissingStartByte);
        }
        let header = Self {
            index: u16::from_be_bytes([bytes[1], bytes[2]]),
            total: u16::from_be_bytes([bytes[3], bytes[4]]),
            size: u16::from_be_bytes([bytes[5], bytes[6]]),
        };
        if header.index >= header.total {
            return Err(ChunkError::InvalidIndex {
                index: header.index,
                total: header.total,
            });
        }
        Ok(header)
    }

    pub fn is_last(&self) -> bool {
        self.index as u32 + 1 == self.total as u32
    }
}

/// Number of chunks needed for `len` bytes, i.e. `ceil(len / chunk_size)`.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    len.div_ceil(chunk_size)
}

pub fn encode_chunk<'a>(
    buffer: &'a mut [u8],
    index: u16,
    total: u16,
    payload: &[u8],
) -> Result<&'a [u8], EncodeError> {
    let size: u16 = payload
        .len()
        .try_into()
        .map_err(|_| EncodeError::PayloadTooLong(payload.len()))?;
    let packet_len = CHUNK_OVERHEAD + payload.len();
    if buffer.len() < packet_len {
        return Err(EncodeError::BufferTooSmall);
    }

    let header = ChunkHeader { index, total, size }.to_bytes();
    buffer[..CHUNK_HEADER_LEN].copy_from_slice(&header);
    buffer[CHUNK_HEADER_LEN..(packet_len - 1)].copy_from_slice(payload);
    buffer[packet_len - 1] = chunk_checksum(&header, payload);

    Ok(&buffer[..packet_len])
}

/// Decodes one complete chunk packet.
pub fn decode_chunk(buffer: &[u8]) -> Result<(ChunkHeader, &[u8]), ChunkError> {
    if buffer.len() < CHUNK_OVERHEAD {
        return Err(ChunkError::LengthDoesNotMatch);
    }
    let mut header_bytes = [0u8; CHUNK_HEADER_LEN];
    header_bytes.copy_from_slice(&buffer[..CHUNK_HEADER_LEN]);
    let header = ChunkHeader::from_bytes(&header_bytes)?;
    if buffer.len() != CHUNK_OVERHEAD + header.size as usize {
        return Err(ChunkError::LengthDoesNotMatch);
    }

    let payload = &buffer[CHUNK_HEADER_LEN..(buffer.len() - 1)];
    let expected = buffer[buffer.len() - 1];
    let actual = chunk_checksum(&header_bytes, payload);
    if expected != actual {
        return Err(ChunkError::ChecksumDoesNotMatch { expected, actual });
    }
    Ok((header, payload))
}
