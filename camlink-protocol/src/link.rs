use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{Read, ReadExactError, Write};

use crate::codec::{encode_frame, EncodeError, Frame, MAX_FRAME_LEN};
use crate::receiver::FrameReceiver;
use crate::utils::run_with_timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError<E> {
    SerialError(E),
    Encode(EncodeError),
    /// The peer closed the stream.
    Closed,
    Timeout,
}

/// One end of the serial link: the two halves of a UART plus the delay used for deadlines.
pub struct Link<T, R, D> {
    pub(crate) tx: T,
    pub(crate) rx: R,
    pub(crate) delay: D,
}

impl<T, R, D> Link<T, R, D>
where
    R: Read,
    T: Write<Error = R::Error>,
    D: DelayNs + Copy,
{
    pub fn new(tx: T, rx: R, delay: D) -> Self {
        Self { tx, rx, delay }
    }

    pub fn into_inner(self) -> (T, R, D) {
        (self.tx, self.rx, self.delay)
    }

    pub async fn write_all(&mut self, data: &[u8]) -> Result<(), LinkError<R::Error>> {
        self.tx
            .write_all(data)
            .await
            .map_err(LinkError::SerialError)?;
        self.tx.flush().await.map_err(LinkError::SerialError)
    }

    pub async fn write_byte(&mut self, byte: u8) -> Result<(), LinkError<R::Error>> {
        self.write_all(&[byte]).await
    }

    pub async fn send_frame(&mut self, kind: u8, payload: &[u8]) -> Result<(), LinkError<R::Error>> {
        let mut buffer = [0u8; MAX_FRAME_LEN];
        let encoded = encode_frame(&mut buffer, kind, payload).map_err(LinkError::Encode)?;
        self.write_all(encoded).await
    }

    /// Waits for the next byte without a deadline.
    pub async fn next_byte(&mut self) -> Result<u8, LinkError<R::Error>> {
        read_one(&mut self.rx).await
    }

    pub async fn read_byte(&mut self, timeout_ms: u32) -> Result<u8, LinkError<R::Error>> {
        let mut delay = self.delay;
        run_with_timeout(&mut delay, timeout_ms, read_one(&mut self.rx))
            .await
            .map_err(|_| LinkError::Timeout)?
    }

    /// Fills `buffer` without a deadline.
    pub async fn fill(&mut self, buffer: &mut [u8]) -> Result<(), LinkError<R::Error>> {
        self.rx.read_exact(buffer).await.map_err(|e| match e {
            ReadExactError::UnexpectedEof => LinkError::Closed,
            ReadExactError::Other(e) => LinkError::SerialError(e),
        })
    }

    pub async fn read_exact(
        &mut self,
        buffer: &mut [u8],
        timeout_ms: u32,
    ) -> Result<(), LinkError<R::Error>> {
        let mut delay = self.delay;
        run_with_timeout(&mut delay, timeout_ms, self.fill(buffer))
            .await
            .map_err(|_| LinkError::Timeout)?
    }

    /// Discards bytes until `expected` arrives. Returns `false` if the deadline
    /// passes first.
    pub async fn wait_for_byte(
        &mut self,
        expected: u8,
        timeout_ms: u32,
    ) -> Result<bool, LinkError<R::Error>> {
        let mut delay = self.delay;
        let rx = &mut self.rx;
        let wait = async {
            loop {
                let byte = read_one(rx).await?;
                if byte == expected {
                    return Ok(());
                }
                log_trace!("Ignoring byte {}", byte);
            }
        };
        match run_with_timeout(&mut delay, timeout_ms, wait).await {
            Ok(Ok(())) => Ok(true),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(false),
        }
    }

    /// Discards bytes until the line has been silent for `idle_ms`, giving up
    /// after `max_ms`. Returns the number of bytes discarded.
    pub async fn drain(&mut self, idle_ms: u32, max_ms: u32) -> Result<usize, LinkError<R::Error>> {
        let mut delay = self.delay;
        let mut idle_delay = self.delay;
        let mut discarded = 0usize;
        let rx = &mut self.rx;
        let count = &mut discarded;
        let drain = async move {
            loop {
                match run_with_timeout(&mut idle_delay, idle_ms, read_one(rx)).await {
                    Ok(Ok(_)) => *count += 1,
                    Ok(Err(e)) => return Err(e),
                    Err(_) => return Ok(()),
                }
            }
        };
        let result = run_with_timeout(&mut delay, max_ms, drain).await;
        match result {
            Ok(Err(e)) => Err(e),
            Ok(Ok(())) => Ok(discarded),
            Err(_) => {
                log_warn!("Line still busy after {} ms", max_ms);
                Ok(discarded)
            }
        }
    }

    /// Reads until `receiver` yields a valid frame. Corrupted frames are logged
    /// and skipped, they do not end the wait.
    pub async fn receive_frame(
        &mut self,
        receiver: &mut FrameReceiver,
    ) -> Result<Frame, LinkError<R::Error>> {
        loop {
            let byte = read_one(&mut self.rx).await?;
            match receiver.push(byte) {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) => {}
                Err(e) => {
                    log_warn!("Error decoding frame: {:?}", e);
                }
            }
        }
    }

    pub async fn receive_frame_timeout(
        &mut self,
        receiver: &mut FrameReceiver,
        timeout_ms: u32,
    ) -> Result<Frame, LinkError<R::Error>> {
        let mut delay = self.delay;
        let result = run_with_timeout(&mut delay, timeout_ms, self.receive_frame(receiver)).await;
        match result {
            Ok(result) => result,
            Err(_) => {
                receiver.reset();
                Err(LinkError::Timeout)
            }
        }
    }
}

async fn read_one<R: Read>(rx: &mut R) -> Result<u8, LinkError<R::Error>> {
    let mut byte = [0u8; 1];
    match rx.read(&mut byte).await {
        Ok(0) => Err(LinkError::Closed),
        Ok(_) => Ok(byte[0]),
        Err(e) => Err(LinkError::SerialError(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CommandId, START_BYTE};
    use crate::test_utils::serial_pair;

    #[tokio::test(start_paused = true)]
    async fn frame_crosses_the_link() {
        let (mut a, mut b) = serial_pair();
        a.send_frame(CommandId::Capture as u8, &[7, 8]).await.unwrap();

        let mut receiver = FrameReceiver::new();
        let frame = b.receive_frame_timeout(&mut receiver, 100).await.unwrap();
        assert_eq!(frame.command(), Ok(CommandId::Capture));
        assert_eq!(frame.payload.as_slice(), &[7, 8]);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_link_times_out() {
        let (_a, mut b) = serial_pair();
        assert_eq!(b.read_byte(20).await, Err(LinkError::Timeout));

        let mut buffer = [0u8; 4];
        assert_eq!(b.read_exact(&mut buffer, 20).await, Err(LinkError::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn partial_frame_is_discarded_on_timeout() {
        let (mut a, mut b) = serial_pair();
        a.write_all(&[START_BYTE, 0x03]).await.unwrap();

        let mut receiver = FrameReceiver::new();
        assert_eq!(
            b.receive_frame_timeout(&mut receiver, 50).await,
            Err(LinkError::Timeout)
        );
        assert!(receiver.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_stops_once_the_line_is_idle() {
        let (mut a, mut b) = serial_pair();
        a.write_all(&[START_BYTE, 1, 2, 3]).await.unwrap();
        assert_eq!(b.drain(50, 1000).await, Ok(4));

        a.write_all(&[9]).await.unwrap();
        assert_eq!(b.read_byte(10).await, Ok(9));
        assert_eq!(b.drain(50, 1000).await, Ok(0));
    }

    #[tokio::test]
    async fn closed_peer_is_reported() {
        let (a, mut b) = serial_pair();
        drop(a);
        assert_eq!(b.next_byte().await, Err(LinkError::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_past_other_bytes() {
        let (mut a, mut b) = serial_pair();
        a.write_all(&[0x15, 0x00, 0x06]).await.unwrap();
        assert_eq!(b.wait_for_byte(0x06, 100).await, Ok(true));

        a.write_all(&[0x15, 0x15]).await.unwrap();
        assert_eq!(b.wait_for_byte(0x06, 100).await, Ok(false));
    }
}
