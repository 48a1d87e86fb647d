use std::convert::Infallible;
use std::path::Path;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};
use tokio::time::sleep;

#[derive(Debug)]
pub struct IoErrorWrapper(pub std::io::Error);

impl embedded_io_async::Error for IoErrorWrapper {
    fn kind(&self) -> embedded_io_async::ErrorKind {
        embedded_io_async::ErrorKind::Other
    }
}

pub struct VecReader {
    pub buffer: Vec<u8>,
    pub offset: usize,
}

impl VecReader {
    pub fn new(buffer: Vec<u8>) -> Self {
        Self { buffer, offset: 0 }
    }

    fn data_left(&self) -> usize {
        self.buffer.len() - self.offset
    }
}

impl embedded_io_async::ErrorType for VecReader {
    type Error = Infallible;
}

impl embedded_io_async::Read for VecReader {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let len = buf.len().min(self.data_left());
        buf[..len].copy_from_slice(&self.buffer[self.offset..self.offset + len]);
        self.offset += len;
        Ok(len)
    }
}

/// Delivers the wrapped stream no faster than `byte_rate`, like a live microphone.
pub struct PacedReader<R> {
    inner: R,
    byte_rate: u32,
}

impl<R> PacedReader<R> {
    pub fn new(inner: R, byte_rate: u32) -> Self {
        Self {
            inner,
            byte_rate: byte_rate.max(1),
        }
    }
}

impl<R: embedded_io_async::ErrorType> embedded_io_async::ErrorType for PacedReader<R> {
    type Error = R::Error;
}

impl<R: embedded_io_async::Read> embedded_io_async::Read for PacedReader<R> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let len = self.inner.read(buf).await?;
        let micros = len as u64 * 1_000_000 / self.byte_rate as u64;
        sleep(Duration::from_micros(micros)).await;
        Ok(len)
    }
}

pub struct FileReader(File);

impl FileReader {
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        Ok(Self(File::open(path).await?))
    }
}

impl embedded_io_async::ErrorType for FileReader {
    type Error = IoErrorWrapper;
}

impl embedded_io_async::Read for FileReader {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.0.read(buf).await.map_err(IoErrorWrapper)
    }
}

impl embedded_io_async::Seek for FileReader {
    async fn seek(&mut self, pos: embedded_io_async::SeekFrom) -> Result<u64, Self::Error> {
        let pos = match pos {
            embedded_io_async::SeekFrom::Start(offset) => std::io::SeekFrom::Start(offset),
            embedded_io_async::SeekFrom::End(offset) => std::io::SeekFrom::End(offset),
            embedded_io_async::SeekFrom::Current(offset) => std::io::SeekFrom::Current(offset),
        };
        self.0.seek(pos).await.map_err(IoErrorWrapper)
    }
}

pub struct FileWriter(BufWriter<File>);

impl FileWriter {
    pub async fn create(path: &Path) -> std::io::Result<Self> {
        Ok(Self(BufWriter::new(File::create(path).await?)))
    }
}

impl embedded_io_async::ErrorType for FileWriter {
    type Error = IoErrorWrapper;
}

impl embedded_io_async::Write for FileWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.0.write(buf).await.map_err(IoErrorWrapper)
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.0.flush().await.map_err(IoErrorWrapper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io_async::{Read, Seek, SeekFrom, Write};

    #[tokio::test]
    async fn vec_reader_drains_in_pieces() {
        let mut reader = VecReader::new(vec![1, 2, 3, 4, 5]);
        let mut buf = [0u8; 2];
        assert_eq!(reader.read(&mut buf).await, Ok(2));
        assert_eq!(reader.read(&mut buf).await, Ok(2));
        assert_eq!(reader.read(&mut buf).await, Ok(1));
        assert_eq!(buf[0], 5);
        assert_eq!(reader.read(&mut buf).await, Ok(0));
    }

    #[tokio::test(start_paused = true)]
    async fn paced_reader_waits_for_the_byte_rate() {
        let mut reader = PacedReader::new(VecReader::new(vec![0; 32_000]), 32_000);
        let mut buf = [0u8; 16_000];
        let start = tokio::time::Instant::now();
        reader.read(&mut buf).await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_millis(510));
    }

    #[tokio::test]
    async fn file_reader_seeks() {
        let path = std::env::temp_dir().join(format!("camlink-file-io-{}", std::process::id()));
        let mut writer = FileWriter::create(&path).await.unwrap();
        writer.write_all(b"0123456789").await.unwrap();
        writer.flush().await.unwrap();

        let mut reader = FileReader::open(&path).await.unwrap();
        assert_eq!(reader.seek(SeekFrom::End(0)).await.unwrap(), 10);
        reader.seek(SeekFrom::Start(6)).await.unwrap();
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"6789");
        std::fs::remove_file(&path).unwrap();
    }
}
