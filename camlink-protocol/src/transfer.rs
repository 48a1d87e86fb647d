use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{Error as _, Read, ReadExactError, Seek, SeekFrom, Write};

use crate::checksum::crc8;
use crate::chunk::{
    chunk_count, decode_chunk, encode_chunk, ChunkError, ChunkHeader, ACK, CHUNK_HEADER_LEN,
    CHUNK_OVERHEAD, NACK,
};
use crate::codec::{StatusCode, START_BYTE};
use crate::config::{LinkConfig, MAX_CHUNK_SIZE};
use crate::link::{Link, LinkError};
use crate::utils::run_with_timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferError<E> {
    Link(LinkError<E>),
    /// The image has no bytes.
    EmptySource,
    /// Larger than the configured maximum, the destination, or a 16-bit chunk count.
    ImageTooLarge,
    /// Reading or seeking the image source failed.
    Source,
    RetriesExhausted { index: u16 },
    /// Too many consecutive chunks were rejected.
    Timeout,
    /// The camera answered with an error frame instead of chunks.
    Refused(StatusCode),
}

impl<E> From<LinkError<E>> for TransferError<E> {
    fn from(value: LinkError<E>) -> Self {
        Self::Link(value)
    }
}

/// Streams `source` as chunk packets. Each chunk is resent, from the same
/// offset of the source, until the peer acknowledges it. Any byte other than
/// ACK, NACK included, is ignored. Returns the number of chunks sent.
pub async fn send_image<T, R, D, S>(
    link: &mut Link<T, R, D>,
    source: &mut S,
    config: &LinkConfig,
) -> Result<u16, TransferError<R::Error>>
where
    R: Read,
    T: Write<Error = R::Error>,
    D: DelayNs + Copy,
    S: Read + Seek,
{
    let size = match source.seek(SeekFrom::End(0)).await {
        Ok(size) => size,
        Err(e) => {
            log_error!("Failed to get image size: {:?}", e.kind());
            return Err(TransferError::Source);
        }
    };
    if size == 0 {
        return Err(TransferError::EmptySource);
    }
    if size > config.max_image_size as u64 {
        log_warn!(
            "Image is {} bytes, limit is {}",
            size,
            config.max_image_size
        );
        return Err(TransferError::ImageTooLarge);
    }

    let size = size as usize;
    let chunk_size = config.effective_chunk_size();
    let total: u16 = chunk_count(size, chunk_size)
        .try_into()
        .map_err(|_| TransferError::ImageTooLarge)?;
    log_info!(
        "Sending {} bytes in {} chunks of {}",
        size,
        total,
        chunk_size
    );

    let mut payload = [0u8; MAX_CHUNK_SIZE];
    let mut packet = [0u8; MAX_CHUNK_SIZE + CHUNK_OVERHEAD];
    for index in 0..total {
        let offset = index as usize * chunk_size;
        let len = chunk_size.min(size - offset);
        let mut retries = 0u32;
        loop {
            if let Err(e) = source.seek(SeekFrom::Start(offset as u64)).await {
                log_error!("Failed to seek image: {:?}", e.kind());
                return Err(TransferError::Source);
            }
            match source.read_exact(&mut payload[..len]).await {
                Ok(()) => {}
                Err(ReadExactError::UnexpectedEof) => {
                    log_error!("Image ended before chunk {}", index);
                    return Err(TransferError::Source);
                }
                Err(ReadExactError::Other(e)) => {
                    log_error!("Failed to read image: {:?}", e.kind());
                    return Err(TransferError::Source);
                }
            }
            let encoded = encode_chunk(&mut packet, index, total, &payload[..len])
                .map_err(LinkError::Encode)?;
            link.write_all(encoded).await?;

            if link.wait_for_byte(ACK, config.ack_timeout_ms).await? {
                log_trace!("Chunk {}/{} acknowledged", index + 1, total);
                break;
            }

            retries += 1;
            if let Some(max_retries) = config.max_chunk_retries {
                if retries > max_retries {
                    log_error!("Giving up on chunk {}/{}", index + 1, total);
                    return Err(TransferError::RetriesExhausted { index });
                }
            }
            log_warn!(
                "No ACK for chunk {}/{}, resending (retry {})",
                index + 1,
                total,
                retries
            );
        }
    }

    Ok(total)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RejectReason {
    HeaderTimeout,
    PayloadTimeout,
    ChecksumTimeout,
    InvalidHeader(ChunkError),
    Oversized(u16),
    Checksum { expected: u8, actual: u8 },
    UnexpectedIndex { expected: u16, actual: u16 },
    TotalChanged { expected: u16, actual: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChunkOutcome {
    Accepted(ChunkHeader),
    /// The last chunk arrived. Carries the image length.
    Complete(usize),
    /// A NACK was sent and the expected index is unchanged.
    Rejected(RejectReason),
    Refused(StatusCode),
}

enum HeaderRead {
    Chunk([u8; CHUNK_HEADER_LEN]),
    Refused(StatusCode),
}

/// Receives a chunk stream into a caller-owned buffer, strictly in order.
pub struct ImageReceiver<'b> {
    destination: &'b mut [u8],
    received: usize,
    expected_index: u16,
    total: Option<u16>,
    failures: u32,
}

impl<'b> ImageReceiver<'b> {
    pub fn new(destination: &'b mut [u8]) -> Self {
        Self {
            destination,
            received: 0,
            expected_index: 0,
            total: None,
            failures: 0,
        }
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn expected_index(&self) -> u16 {
        self.expected_index
    }

    pub async fn run<T, R, D>(
        mut self,
        link: &mut Link<T, R, D>,
        config: &LinkConfig,
    ) -> Result<usize, TransferError<R::Error>>
    where
        R: Read,
        T: Write<Error = R::Error>,
        D: DelayNs + Copy,
    {
        loop {
            match self.step(link, config).await? {
                ChunkOutcome::Complete(len) => return Ok(len),
                ChunkOutcome::Refused(status) => return Err(TransferError::Refused(status)),
                ChunkOutcome::Accepted(_) | ChunkOutcome::Rejected(_) => {}
            }
        }
    }

    /// Reads one chunk and answers it with ACK or NACK.
    pub async fn step<T, R, D>(
        &mut self,
        link: &mut Link<T, R, D>,
        config: &LinkConfig,
    ) -> Result<ChunkOutcome, TransferError<R::Error>>
    where
        R: Read,
        T: Write<Error = R::Error>,
        D: DelayNs + Copy,
    {
        let allow_refusal = self.expected_index == 0 && self.received == 0;
        let mut delay = link.delay;
        let header_bytes = match run_with_timeout(
            &mut delay,
            config.chunk_timeout_ms,
            read_header(link, allow_refusal),
        )
        .await
        {
            Ok(Ok(HeaderRead::Chunk(bytes))) => bytes,
            Ok(Ok(HeaderRead::Refused(status))) => {
                log_warn!("Camera refused the transfer: {:?}", status);
                return Ok(ChunkOutcome::Refused(status));
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return self.reject(link, config, RejectReason::HeaderTimeout).await,
        };

        let header = match ChunkHeader::from_bytes(&header_bytes) {
            Ok(header) => header,
            Err(e) => return self.reject(link, config, RejectReason::InvalidHeader(e)).await,
        };
        let size = header.size as usize;
        if size > config.effective_chunk_size() {
            return self
                .reject(link, config, RejectReason::Oversized(header.size))
                .await;
        }

        let mut packet = [0u8; MAX_CHUNK_SIZE + CHUNK_OVERHEAD];
        packet[..CHUNK_HEADER_LEN].copy_from_slice(&header_bytes);
        match link
            .read_exact(
                &mut packet[CHUNK_HEADER_LEN..(CHUNK_HEADER_LEN + size)],
                config.chunk_timeout_ms,
            )
            .await
        {
            Ok(()) => {}
            Err(LinkError::Timeout) => {
                return self.reject(link, config, RejectReason::PayloadTimeout).await
            }
            Err(e) => return Err(e.into()),
        }
        match link.read_byte(config.checksum_timeout_ms).await {
            Ok(checksum) => packet[CHUNK_HEADER_LEN + size] = checksum,
            Err(LinkError::Timeout) => {
                return self.reject(link, config, RejectReason::ChecksumTimeout).await
            }
            Err(e) => return Err(e.into()),
        }

        let payload = match decode_chunk(&packet[..(CHUNK_OVERHEAD + size)]) {
            Ok((_, payload)) => payload,
            Err(ChunkError::ChecksumDoesNotMatch { expected, actual }) => {
                return self
                    .reject(link, config, RejectReason::Checksum { expected, actual })
                    .await
            }
            Err(e) => return self.reject(link, config, RejectReason::InvalidHeader(e)).await,
        };

        if header.index != self.expected_index {
            let reason = RejectReason::UnexpectedIndex {
                expected: self.expected_index,
                actual: header.index,
            };
            return self.reject(link, config, reason).await;
        }
        if let Some(total) = self.total {
            if total != header.total {
                let reason = RejectReason::TotalChanged {
                    expected: total,
                    actual: header.total,
                };
                return self.reject(link, config, reason).await;
            }
        }

        let end = self.received + size;
        if end > self.destination.len() {
            log_error!(
                "Image does not fit the {} byte buffer",
                self.destination.len()
            );
            return Err(TransferError::ImageTooLarge);
        }
        self.destination[self.received..end].copy_from_slice(payload);
        self.received = end;
        self.total = Some(header.total);
        self.failures = 0;
        link.write_byte(ACK).await?;

        if header.is_last() {
            log_info!("Received {} bytes in {} chunks", self.received, header.total);
            Ok(ChunkOutcome::Complete(self.received))
        } else {
            log_trace!("Chunk {}/{} accepted", header.index + 1, header.total);
            self.expected_index += 1;
            Ok(ChunkOutcome::Accepted(header))
        }
    }

    async fn reject<T, R, D>(
        &mut self,
        link: &mut Link<T, R, D>,
        config: &LinkConfig,
        reason: RejectReason,
    ) -> Result<ChunkOutcome, TransferError<R::Error>>
    where
        R: Read,
        T: Write<Error = R::Error>,
        D: DelayNs + Copy,
    {
        log_warn!(
            "Rejecting chunk, expected index {}: {:?}",
            self.expected_index,
            reason
        );
        // The rest of a misframed packet is dropped so the resend starts on a header.
        let discarded = link
            .drain(config.resync_idle_ms, config.chunk_timeout_ms)
            .await?;
        if discarded > 0 {
            log_trace!("Discarded {} bytes after reject", discarded);
        }
        link.write_byte(NACK).await?;
        self.failures += 1;
        if let Some(max_failures) = config.max_receive_failures {
            if self.failures >= max_failures {
                log_error!("{} consecutive chunks rejected", self.failures);
                return Err(TransferError::Timeout);
            }
        }
        Ok(ChunkOutcome::Rejected(reason))
    }
}

/// Skips to a start byte and reads the rest of a chunk header. When
/// `allow_refusal` is set, a payload-less error frame in place of the first
/// header is recognised.
async fn read_header<T, R, D>(
    link: &mut Link<T, R, D>,
    allow_refusal: bool,
) -> Result<HeaderRead, LinkError<R::Error>>
where
    R: Read,
    T: Write<Error = R::Error>,
    D: DelayNs + Copy,
{
    let mut bytes = [0u8; CHUNK_HEADER_LEN];
    loop {
        let byte = link.next_byte().await?;
        if byte == START_BYTE {
            bytes[0] = byte;
            break;
        }
        log_trace!("Skipping byte {} before chunk header", byte);
    }

    link.fill(&mut bytes[1..4]).await?;
    // An error frame is [START][status][0][crc]. Chunk 0 always has a zero first byte.
    if allow_refusal && bytes[1] != 0 && bytes[2] == 0 && crc8(&bytes[..3]) == bytes[3] {
        if let Ok(status) = StatusCode::try_from(bytes[1]) {
            return Ok(HeaderRead::Refused(status));
        }
    }
    link.fill(&mut bytes[4..]).await?;
    Ok(HeaderRead::Chunk(bytes))
}
