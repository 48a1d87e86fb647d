use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{Read, Write};

use crate::codec::{CommandId, Frame, StatusCode};
use crate::config::LinkConfig;
use crate::link::{Link, LinkError};
use crate::receiver::FrameReceiver;
use crate::transfer::{ImageReceiver, TransferError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestError<E> {
    Link(LinkError<E>),
    Transfer(TransferError<E>),
    UnknownStatus(u8),
    /// The camera answered with a status other than Success.
    Status(StatusCode),
    ProtocolError,
}

impl<E> From<LinkError<E>> for RequestError<E> {
    fn from(value: LinkError<E>) -> Self {
        Self::Link(value)
    }
}

impl<E> From<TransferError<E>> for RequestError<E> {
    fn from(value: TransferError<E>) -> Self {
        match value {
            TransferError::Link(e) => Self::Link(e),
            TransferError::Refused(status) => Self::Status(status),
            e => Self::Transfer(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CameraStatus {
    pub store_ready: bool,
    /// Low byte of the camera's capture counter.
    pub capture_count: u8,
}

/// Master side of the link. One request is outstanding at a time; requests
/// are not retried.
pub struct CameraClient<T, R, D> {
    link: Link<T, R, D>,
    config: LinkConfig,
    receiver: FrameReceiver,
}

impl<T, R, D> CameraClient<T, R, D>
where
    R: Read,
    T: Write<Error = R::Error>,
    D: DelayNs + Copy,
{
    pub fn new(link: Link<T, R, D>, config: LinkConfig) -> Self {
        Self {
            link,
            config,
            receiver: FrameReceiver::new(),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Sends a raw frame and waits for any valid response frame.
    pub async fn request(&mut self, kind: u8, payload: &[u8]) -> Result<Frame, RequestError<R::Error>> {
        self.receiver.reset();
        self.link.send_frame(kind, payload).await?;
        self.receive_response().await
    }

    async fn receive_response(&mut self) -> Result<Frame, RequestError<R::Error>> {
        let frame = self
            .link
            .receive_frame_timeout(&mut self.receiver, self.config.response_timeout_ms)
            .await?;
        log_trace!("Response {:?}", frame);
        Ok(frame)
    }

    /// Sends `command` and requires a Success response.
    async fn command(&mut self, command: CommandId) -> Result<Frame, RequestError<R::Error>> {
        let frame = self.request(command as u8, &[]).await?;
        expect_success(frame)
    }

    pub async fn capture(&mut self) -> Result<(), RequestError<R::Error>> {
        self.command(CommandId::Capture).await?;
        Ok(())
    }

    pub async fn get_status(&mut self) -> Result<CameraStatus, RequestError<R::Error>> {
        let frame = self.command(CommandId::GetStatus).await?;
        match frame.payload.as_slice() {
            [ready, count] => Ok(CameraStatus {
                store_ready: *ready != 0,
                capture_count: *count,
            }),
            _ => Err(RequestError::ProtocolError),
        }
    }

    pub async fn delete_image(&mut self) -> Result<(), RequestError<R::Error>> {
        self.command(CommandId::DeleteImage).await?;
        Ok(())
    }

    /// Transfers the camera's latest image into `destination` and returns its length.
    pub async fn fetch_image(&mut self, destination: &mut [u8]) -> Result<usize, RequestError<R::Error>> {
        self.receiver.reset();
        self.link
            .send_frame(CommandId::SendImage as u8, &[])
            .await?;

        let len = ImageReceiver::new(destination)
            .run(&mut self.link, &self.config)
            .await?;

        let frame = self.receive_response().await?;
        expect_success(frame)?;
        Ok(len)
    }

    /// Capture followed by a transfer of the new image.
    pub async fn capture_image(&mut self, destination: &mut [u8]) -> Result<usize, RequestError<R::Error>> {
        self.capture().await?;
        self.fetch_image(destination).await
    }
}

fn expect_success<E>(frame: Frame) -> Result<Frame, RequestError<E>> {
    match frame.status() {
        Ok(StatusCode::Success) => Ok(frame),
        Ok(status) => {
            log_warn!("Camera responded {:?}", status);
            Err(RequestError::Status(status))
        }
        Err(status) => Err(RequestError::UnknownStatus(status)),
    }
}
