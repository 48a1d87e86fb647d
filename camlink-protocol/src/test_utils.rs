use std::convert::Infallible;
use std::string::String;
use std::time::Duration;
use std::vec::Vec;

use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{ErrorType, Read, Seek, SeekFrom, Write};
use tokio::io::{duplex, split, AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

use crate::config::StoreConfig;
use crate::driver::backend::{AnalyzeRequest, Backend};
use crate::driver::clock::Clock;
use crate::driver::indicator::Indicator;
use crate::driver::rng::RNG;
use crate::image_store::{evict_oldest, ImageId, ImageStore, MAX_LISTED_IMAGES};
use crate::link::Link;
use crate::session::state::Mode;

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone, Copy)]
pub(crate) struct TokioDelay;

impl DelayNs for TokioDelay {
    async fn delay_ns(&mut self, ns: u32) {
        tokio::time::sleep(Duration::from_nanos(ns as u64)).await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        tokio::time::sleep(Duration::from_millis(ms as u64)).await;
    }
}

#[derive(Clone)]
pub(crate) struct FixedClock(pub f64);

impl Clock for FixedClock {
    fn now_ms(&self) -> f64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TestSerialError(std::io::ErrorKind);

impl embedded_io_async::Error for TestSerialError {
    fn kind(&self) -> embedded_io_async::ErrorKind {
        embedded_io_async::ErrorKind::Other
    }
}

pub(crate) struct TestRx(ReadHalf<DuplexStream>);

impl ErrorType for TestRx {
    type Error = TestSerialError;
}

impl Read for TestRx {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.0
            .read(buf)
            .await
            .map_err(|e| TestSerialError(e.kind()))
    }
}

pub(crate) struct TestTx(WriteHalf<DuplexStream>);

impl ErrorType for TestTx {
    type Error = TestSerialError;
}

impl Write for TestTx {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.0
            .write(buf)
            .await
            .map_err(|e| TestSerialError(e.kind()))
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.0.flush().await.map_err(|e| TestSerialError(e.kind()))
    }
}

pub(crate) type TestLink = Link<TestTx, TestRx, TokioDelay>;

/// Two link ends connected back to back. Dropping one end closes the other.
pub(crate) fn serial_pair() -> (TestLink, TestLink) {
    let (a, b) = duplex(64 * 1024);
    let (a_rx, a_tx) = split(a);
    let (b_rx, b_tx) = split(b);
    (
        Link::new(TestTx(a_tx), TestRx(a_rx), TokioDelay),
        Link::new(TestTx(b_tx), TestRx(b_rx), TokioDelay),
    )
}

pub(crate) struct MemoryReader {
    data: Vec<u8>,
    position: usize,
}

impl MemoryReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, position: 0 }
    }
}

impl ErrorType for MemoryReader {
    type Error = Infallible;
}

impl Read for MemoryReader {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
        let len = buf.len().min(self.data.len() - self.position);
        buf[..len].copy_from_slice(&self.data[self.position..(self.position + len)]);
        self.position += len;
        Ok(len)
    }
}

impl Seek for MemoryReader {
    async fn seek(&mut self, pos: SeekFrom) -> Result<u64, Infallible> {
        let position = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => self.data.len() as i64 + offset,
            SeekFrom::Current(offset) => self.position as i64 + offset,
        };
        self.position = position.clamp(0, self.data.len() as i64) as usize;
        Ok(self.position as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MemoryStoreError {
    CaptureFailed,
    NotFound,
    BadName,
}

/// Image store backed by a list. Every capture stores a copy of `image`.
pub(crate) struct MemoryImageStore {
    config: StoreConfig,
    images: Vec<(ImageId, Vec<u8>)>,
    next_stamp: u64,
    pub image: Vec<u8>,
    pub fail_capture: bool,
}

impl MemoryImageStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            images: Vec::new(),
            next_stamp: 1000,
            image: vec![0xFF, 0xD8, 0xFF, 0xD9],
            fail_capture: false,
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }
}

impl ImageStore for MemoryImageStore {
    type Error = MemoryStoreError;
    type Reader<'a> = MemoryReader;

    fn is_ready(&self) -> bool {
        true
    }

    async fn capture(&mut self) -> Result<ImageId, MemoryStoreError> {
        if self.fail_capture {
            return Err(MemoryStoreError::CaptureFailed);
        }
        let max_images = self.config.max_images;
        evict_oldest(self, max_images).await?;

        let id = self
            .config
            .image_id(self.next_stamp)
            .map_err(|_| MemoryStoreError::BadName)?;
        self.next_stamp += 1;
        self.images.push((id.clone(), self.image.clone()));
        Ok(id)
    }

    async fn open(&mut self, id: &ImageId) -> Result<MemoryReader, MemoryStoreError> {
        self.images
            .iter()
            .find(|(stored, _)| stored == id)
            .map(|(_, data)| MemoryReader::new(data.clone()))
            .ok_or(MemoryStoreError::NotFound)
    }

    async fn delete(&mut self, id: &ImageId) -> Result<(), MemoryStoreError> {
        let index = self
            .images
            .iter()
            .position(|(stored, _)| stored == id)
            .ok_or(MemoryStoreError::NotFound)?;
        self.images.remove(index);
        Ok(())
    }

    async fn list(&mut self) -> Result<heapless::Vec<ImageId, MAX_LISTED_IMAGES>, MemoryStoreError> {
        Ok(self
            .images
            .iter()
            .take(MAX_LISTED_IMAGES)
            .map(|(id, _)| id.clone())
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct RecordingIndicator {
    pub changes: Vec<bool>,
}

impl Indicator for RecordingIndicator {
    async fn set_enable(&mut self, enable: bool) {
        self.changes.push(enable);
    }
}

#[derive(Default)]
pub(crate) struct VecWriter {
    pub data: Vec<u8>,
}

impl ErrorType for VecWriter {
    type Error = Infallible;
}

impl Write for VecWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }
}

pub(crate) struct FixedRng {
    bytes: Vec<u8>,
    position: usize,
}

impl FixedRng {
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            position: 0,
        }
    }
}

impl RNG for FixedRng {
    async fn next_bytes(&mut self, buffer: &mut [u8]) {
        for byte in buffer.iter_mut() {
            *byte = self.bytes[self.position % self.bytes.len()];
            self.position += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedRequest {
    pub session_id: String,
    pub mode: Mode,
    pub image: Vec<u8>,
    pub audio: Option<Vec<u8>>,
}

#[derive(Debug)]
pub(crate) struct UploadRejected;

pub(crate) struct FakeBackend {
    response: Vec<u8>,
    pub fail: bool,
    pub requests: Vec<RecordedRequest>,
}

impl FakeBackend {
    pub fn new(response: Vec<u8>) -> Self {
        Self {
            response,
            fail: false,
            requests: Vec::new(),
        }
    }
}

impl Backend for FakeBackend {
    type Error = UploadRejected;
    type Response<'a> = &'a [u8];

    async fn analyze(&mut self, request: AnalyzeRequest<'_>) -> Result<&[u8], UploadRejected> {
        self.requests.push(RecordedRequest {
            session_id: request.session_id.into(),
            mode: request.mode,
            image: request.image.to_vec(),
            audio: request.audio.map(|audio| audio.to_vec()),
        });
        if self.fail {
            return Err(UploadRejected);
        }
        Ok(self.response.as_slice())
    }
}
