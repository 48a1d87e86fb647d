use anyhow::Result;
use camlink_protocol::Link;
use tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::file_io::IoErrorWrapper;
use crate::Delay;

pub struct SerialRXWrapper<S = SerialStream>(ReadHalf<S>);

impl<S: AsyncRead> embedded_io_async::ErrorType for SerialRXWrapper<S> {
    type Error = IoErrorWrapper;
}

impl<S: AsyncRead> embedded_io_async::Read for SerialRXWrapper<S> {
    async fn read(&mut self, buf: &mut [u8]) -> std::result::Result<usize, Self::Error> {
        self.0.read(buf).await.map_err(IoErrorWrapper)
    }
}

pub struct SerialTXWrapper<S = SerialStream>(WriteHalf<S>);

impl<S: AsyncWrite> embedded_io_async::ErrorType for SerialTXWrapper<S> {
    type Error = IoErrorWrapper;
}

impl<S: AsyncWrite> embedded_io_async::Write for SerialTXWrapper<S> {
    async fn write(&mut self, buf: &[u8]) -> std::result::Result<usize, Self::Error> {
        self.0.write(buf).await.map_err(IoErrorWrapper)
    }

    async fn flush(&mut self) -> std::result::Result<(), Self::Error> {
        self.0.flush().await.map_err(IoErrorWrapper)
    }
}

pub type SerialLink<S = SerialStream> = Link<SerialTXWrapper<S>, SerialRXWrapper<S>, Delay>;

pub fn split_link<S: AsyncRead + AsyncWrite>(stream: S) -> SerialLink<S> {
    let (rx, tx) = split(stream);
    Link::new(SerialTXWrapper(tx), SerialRXWrapper(rx), Delay)
}

/// Opens the port as 8N1 at `baud_rate`.
pub fn create_serial(serial_port_name: &str, baud_rate: u32) -> Result<SerialLink> {
    let serial: SerialStream = tokio_serial::new(serial_port_name, baud_rate).open_native_async()?;
    Ok(split_link(serial))
}
