use crc::{Crc, CRC_8_SMBUS};

/// CRC-8 with polynomial 0x07, initial value 0, MSB first and no final XOR.
pub const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

pub fn crc8(data: &[u8]) -> u8 {
    CRC8.checksum(data)
}

/// Chunk packets are not fully CRC'd: the header CRC is XORed with every payload byte.
pub fn chunk_checksum(header: &[u8], payload: &[u8]) -> u8 {
    payload.iter().fold(crc8(header), |checksum, byte| checksum ^ byte)
}
