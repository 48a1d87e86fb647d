use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{Read, Write};

use crate::codec::{CommandId, Frame, StatusCode};
use crate::config::LinkConfig;
use crate::image_store::{ImageId, ImageStore};
use crate::link::{Link, LinkError};
use crate::receiver::FrameReceiver;
use crate::transfer::{send_image, TransferError};
use crate::utils::DebugFmt;

/// The camera node's command responder. Owns the link, the image store and
/// the pointer to the most recent capture.
pub struct Camera<T, R, D, S> {
    link: Link<T, R, D>,
    store: S,
    config: LinkConfig,
    receiver: FrameReceiver,
    latest: Option<ImageId>,
    capture_count: u32,
}

impl<T, R, D, S> Camera<T, R, D, S>
where
    R: Read,
    T: Write<Error = R::Error>,
    D: DelayNs + Copy,
    S: ImageStore,
{
    pub fn new(link: Link<T, R, D>, store: S, config: LinkConfig) -> Self {
        Self {
            link,
            store,
            config,
            receiver: FrameReceiver::new(),
            latest: None,
            capture_count: 0,
        }
    }

    pub fn latest_image(&self) -> Option<&ImageId> {
        self.latest.as_ref()
    }

    pub fn capture_count(&self) -> u32 {
        self.capture_count
    }

    pub fn store(&mut self) -> &mut S {
        &mut self.store
    }

    /// Serves commands until the link closes.
    pub async fn run(&mut self) -> Result<(), LinkError<R::Error>> {
        loop {
            let frame = match self.next_command().await {
                Ok(frame) => frame,
                Err(LinkError::Closed) => {
                    log_info!("Link closed");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            self.handle_frame(&frame).await?;
        }
    }

    pub async fn next_command(&mut self) -> Result<Frame, LinkError<R::Error>> {
        self.link.receive_frame(&mut self.receiver).await
    }

    /// Executes one command and sends its response. Returns the status sent,
    /// or `None` for an unknown command, which gets no response.
    pub async fn handle_frame(
        &mut self,
        frame: &Frame,
    ) -> Result<Option<StatusCode>, LinkError<R::Error>> {
        let command = match frame.command() {
            Ok(command) => command,
            Err(id) => {
                log_warn!("Ignoring unknown command {}", id);
                return Ok(None);
            }
        };
        log_debug!("Received command {:?}", command);

        let status = match command {
            CommandId::Capture => {
                let status = self.capture().await;
                self.respond(status, &[]).await?;
                status
            }
            CommandId::SendImage => {
                let status = self.send_latest().await?;
                self.respond(status, &[]).await?;
                status
            }
            CommandId::GetStatus => {
                let payload = [
                    self.store.is_ready() as u8,
                    (self.capture_count & 0xFF) as u8,
                ];
                self.respond(StatusCode::Success, &payload).await?;
                StatusCode::Success
            }
            CommandId::DeleteImage => {
                let status = self.delete_latest().await;
                self.respond(status, &[]).await?;
                status
            }
        };
        Ok(Some(status))
    }

    async fn respond(&mut self, status: StatusCode, payload: &[u8]) -> Result<(), LinkError<R::Error>> {
        log_debug!("Responding {:?}", status);
        self.link.send_frame(status as u8, payload).await
    }

    async fn capture(&mut self) -> StatusCode {
        match self.store.capture().await {
            Ok(id) => {
                log_info!("Captured {}", id.as_str());
                self.latest = Some(id);
                self.capture_count = self.capture_count.wrapping_add(1);
                StatusCode::Success
            }
            Err(e) => {
                log_error!("Capture failed: {:?}", DebugFmt(&e));
                StatusCode::CamError
            }
        }
    }

    /// Runs the chunked transfer of the latest image. Errors that leave the
    /// link usable become a status code.
    async fn send_latest(&mut self) -> Result<StatusCode, LinkError<R::Error>> {
        let Some(id) = self.latest.clone() else {
            return Ok(StatusCode::NoImage);
        };
        let mut reader = match self.store.open(&id).await {
            Ok(reader) => reader,
            Err(e) => {
                log_error!("Failed to open {}: {:?}", id.as_str(), DebugFmt(&e));
                return Ok(StatusCode::SdError);
            }
        };

        match send_image(&mut self.link, &mut reader, &self.config).await {
            Ok(total) => {
                log_info!("Sent {} in {} chunks", id.as_str(), total);
                Ok(StatusCode::Success)
            }
            Err(TransferError::Link(e)) => Err(e),
            Err(TransferError::ImageTooLarge) => Ok(StatusCode::ImgTooLarge),
            Err(_) => Ok(StatusCode::SdError),
        }
    }

    async fn delete_latest(&mut self) -> StatusCode {
        let Some(id) = self.latest.take() else {
            return StatusCode::NoImage;
        };
        match self.store.delete(&id).await {
            Ok(()) => {
                log_info!("Deleted {}", id.as_str());
                StatusCode::Success
            }
            Err(e) => {
                log_error!("Failed to delete {}: {:?}", id.as_str(), DebugFmt(&e));
                StatusCode::SdError
            }
        }
    }
}
