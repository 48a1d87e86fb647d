use heapless::Vec;

use crate::checksum::crc8;

pub const START_BYTE: u8 = 0xAA;
/// Start byte, id/status, length and checksum.
pub const FRAME_OVERHEAD: usize = 4;
pub const MAX_FRAME_LEN: usize = 256;
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - FRAME_OVERHEAD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CommandId {
    Capture = 0x01,
    SendImage = 0x02,
    GetStatus = 0x03,
    DeleteImage = 0x04,
}

impl TryFrom<u8> for CommandId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0x01 => Ok(Self::Capture),
            0x02 => Ok(Self::SendImage),
            0x03 => Ok(Self::GetStatus),
            0x04 => Ok(Self::DeleteImage),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum StatusCode {
    Success = 0x00,
    CamError = 0x01,
    SdError = 0x02,
    ImgTooLarge = 0x03,
    NoImage = 0x04,
}

impl TryFrom<u8> for StatusCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0x00 => Ok(Self::Success),
            0x01 => Ok(Self::CamError),
            0x02 => Ok(Self::SdError),
            0x03 => Ok(Self::ImgTooLarge),
            0x04 => Ok(Self::NoImage),
            other => Err(other),
        }
    }
}

/// A checksum-valid frame. `kind` is a command id on the way to the camera
/// and a status code on the way back.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    pub kind: u8,
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
}

impl Frame {
    pub fn new(kind: u8, payload: &[u8]) -> Result<Self, EncodeError> {
        let payload =
            Vec::from_slice(payload).map_err(|_| EncodeError::PayloadTooLong(payload.len()))?;
        Ok(Self { kind, payload })
    }

    pub fn command(&self) -> Result<CommandId, u8> {
        CommandId::try_from(self.kind)
    }

    pub fn status(&self) -> Result<StatusCode, u8> {
        StatusCode::try_from(self.kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    PayloadTooLong(usize),
    BufferTooSmall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    MissingStartByte,
    LengthDoesNotMatch,
    CrcDoesNotMatch { expected: u8, actual: u8 },
}

/// Writes `[START][kind][len][payload][crc8]` into `buffer`. The CRC covers every
/// byte before it, start byte included.
pub fn encode_frame<'a>(
    buffer: &'a mut [u8],
    kind: u8,
    payload: &[u8],
) -> Result<&'a [u8], EncodeError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(EncodeError::PayloadTooLong(payload.len()));
    }
    let frame_len = FRAME_OVERHEAD + payload.len();
    if buffer.len() < frame_len {
        return Err(EncodeError::BufferTooSmall);
    }

    buffer[0] = START_BYTE;
    buffer[1] = kind;
    buffer[2] = payload.len() as u8;
    buffer[3..(3 + payload.len())].copy_from_slice(payload);
    buffer[frame_len - 1] = crc8(&buffer[..(frame_len - 1)]);

    Ok(&buffer[..frame_len])
}

/// Decodes exactly one complete frame.
pub fn decode_frame(buffer: &[u8]) -> Result<Frame, DecodeError> {
    if buffer.len() < FRAME_OVERHEAD {
        return Err(DecodeError::LengthDoesNotMatch);
    }
    if buffer[0] != START_BYTE {
        return Err(DecodeError::MissingStartByte);
    }
    let payload_len = buffer[2] as usize;
    if buffer.len() != FRAME_OVERHEAD + payload_len {
        return Err(DecodeError::LengthDoesNotMatch);
    }

    let expected = buffer[3 + payload_len];
    let actual = crc8(&buffer[..(3 + payload_len)]);
    if expected != actual {
        return Err(DecodeError::CrcDoesNotMatch { expected, actual });
    }

    // A length byte of 253..=255 passes the CRC but cannot fit a frame.
    Frame::new(buffer[1], &buffer[3..(3 + payload_len)])
        .map_err(|_| DecodeError::LengthDoesNotMatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_every_payload_size() {
        let mut buffer = [0u8; MAX_FRAME_LEN];
        for len in 0..=MAX_PAYLOAD_LEN {
            let payload: std::vec::Vec<u8> = (0..len).map(|i| (i * 7 + len) as u8).collect();
            let encoded = encode_frame(&mut buffer, CommandId::SendImage as u8, &payload).unwrap();
            assert_eq!(encoded.len(), len + FRAME_OVERHEAD);

            let decoded = decode_frame(encoded).unwrap();
            assert_eq!(decoded.kind, CommandId::SendImage as u8);
            assert_eq!(decoded.payload.as_slice(), payload.as_slice());
        }
    }

    #[test]
    fn get_status_command_without_payload() {
        let crc = crc8(&[0xAA, 0x03, 0x00]);
        let frame = decode_frame(&[0xAA, 0x03, 0x00, crc]).unwrap();
        assert_eq!(frame.command(), Ok(CommandId::GetStatus));
        assert!(frame.payload.is_empty());

        let mut buffer = [0u8; 8];
        assert_eq!(
            encode_frame(&mut buffer, CommandId::GetStatus as u8, &[]).unwrap(),
            &[0xAA, 0x03, 0x00, crc]
        );
    }

    #[test]
    fn status_response_with_payload() {
        let crc = crc8(&[0xAA, 0x00, 0x02, 0x01, 0x05]);
        let frame = decode_frame(&[0xAA, 0x00, 0x02, 0x01, 0x05, crc]).unwrap();
        assert_eq!(frame.status(), Ok(StatusCode::Success));
        assert_eq!(frame.payload.as_slice(), &[1, 5]);
    }

    #[test]
    fn rejects_oversized_payload() {
        let mut buffer = [0u8; 512];
        let payload = [0u8; MAX_PAYLOAD_LEN + 1];
        assert_eq!(
            encode_frame(&mut buffer, 0x01, &payload),
            Err(EncodeError::PayloadTooLong(MAX_PAYLOAD_LEN + 1))
        );
        assert_eq!(
            Frame::new(0x01, &payload),
            Err(EncodeError::PayloadTooLong(MAX_PAYLOAD_LEN + 1))
        );
    }

    #[test]
    fn rejects_small_buffer() {
        let mut buffer = [0u8; 5];
        assert_eq!(
            encode_frame(&mut buffer, 0x01, &[1, 2]),
            Err(EncodeError::BufferTooSmall)
        );
    }

    #[test]
    fn detects_corruption() {
        let mut buffer = [0u8; 16];
        let encoded = encode_frame(&mut buffer, 0x00, &[1, 5]).unwrap();
        let mut corrupted = [0u8; 6];
        corrupted.copy_from_slice(encoded);
        corrupted[3] ^= 0x10;
        assert!(matches!(
            decode_frame(&corrupted),
            Err(DecodeError::CrcDoesNotMatch { .. })
        ));

        corrupted.copy_from_slice(encoded);
        corrupted[0] = 0x55;
        assert_eq!(decode_frame(&corrupted), Err(DecodeError::MissingStartByte));
        assert_eq!(
            decode_frame(&encoded[..5]),
            Err(DecodeError::LengthDoesNotMatch)
        );
    }

    #[test]
    fn unknown_ids_are_reported() {
        assert_eq!(CommandId::try_from(0x09), Err(0x09));
        assert_eq!(StatusCode::try_from(0x05), Err(0x05));
    }
}
