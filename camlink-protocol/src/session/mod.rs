use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{Error as _, Read, Write};
use futures::future::{select, Either};
use futures::pin_mut;

use crate::button::{ButtonEdges, ButtonEvent};
use crate::codec::StatusCode;
use crate::config::{SessionConfig, MAX_PLAYBACK_CHUNK};
use crate::driver::backend::{AnalyzeRequest, Backend};
use crate::driver::indicator::{blink, Indicator};
use crate::master::{CameraClient, RequestError};
use crate::utils::DebugFmt;

use self::session_id::SessionId;
use self::state::{Mode, SessionEvent, SessionState, TransitionError};
use self::wav::{wav_header, HeaderSkipper, WAV_HEADER_LEN};

pub mod session_id;
pub mod state;
pub mod wav;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionError {
    /// Capture or image transfer failed. Carries the camera's status when it sent one.
    Camera(Option<StatusCode>),
    Upload,
    Playback,
    Transition(TransitionError),
}

impl From<TransitionError> for SessionError {
    fn from(value: TransitionError) -> Self {
        Self::Transition(value)
    }
}

/// The master node's interaction loop: button, microphone, camera, backend and speaker.
///
/// Each call to [`Session::poll`] does one unit of work for the current state.
/// Buffers are borrowed for the lifetime of the session and reused by every cycle.
pub struct Session<'a, M, T, R, D, A, S, I, B>
where
    M: RawMutex,
{
    client: CameraClient<T, R, D>,
    edges: &'a ButtonEdges<M>,
    delay: D,
    mic: A,
    speaker: S,
    indicator: I,
    backend: B,
    config: SessionConfig,
    session_id: SessionId,

    state: SessionState,
    mode: Mode,
    mic_done: bool,
    record_buffer: &'a mut [u8],
    record_len: usize,
    image_buffer: &'a mut [u8],
    image_len: usize,
    last_error: Option<SessionError>,
}

impl<'a, M, T, R, D, A, S, I, B> Session<'a, M, T, R, D, A, S, I, B>
where
    M: RawMutex,
    R: Read,
    T: Write<Error = R::Error>,
    D: DelayNs + Copy,
    A: Read,
    S: Write,
    I: Indicator,
    B: Backend,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: CameraClient<T, R, D>,
        edges: &'a ButtonEdges<M>,
        delay: D,
        mic: A,
        speaker: S,
        indicator: I,
        backend: B,
        config: SessionConfig,
        session_id: SessionId,
        record_buffer: &'a mut [u8],
        image_buffer: &'a mut [u8],
    ) -> Self {
        log_info!("Session id {}", session_id.as_str());
        Self {
            client,
            edges,
            delay,
            mic,
            speaker,
            indicator,
            backend,
            config,
            session_id,
            state: SessionState::Idle,
            mode: Mode::Snapshot,
            mic_done: false,
            record_buffer,
            record_len: 0,
            image_buffer,
            image_len: 0,
            last_error: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn session_id(&self) -> &str {
        self.session_id.as_str()
    }

    pub fn last_error(&self) -> Option<SessionError> {
        self.last_error
    }

    /// Recorded WAV file, header included. Empty unless the last release was a long press.
    pub fn recorded_audio(&self) -> &[u8] {
        &self.record_buffer[..self.record_len]
    }

    pub fn image(&self) -> &[u8] {
        &self.image_buffer[..self.image_len]
    }

    pub async fn run(&mut self) -> ! {
        loop {
            if let Err(e) = self.poll().await {
                log_error!("Session step failed: {:?}", e);
                self.state = SessionState::Idle;
            }
            self.delay.delay_ms(self.config.poll_interval_ms).await;
        }
    }

    /// Polls from idle back to idle. Returns the error shown on the way, if any.
    pub async fn run_cycle(&mut self) -> Result<(), SessionError> {
        self.last_error = None;
        loop {
            if self.poll().await? == SessionState::Idle {
                break;
            }
        }
        match self.last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn poll(&mut self) -> Result<SessionState, SessionError> {
        match self.state {
            SessionState::Idle => {
                let event = self.edges.wait().await;
                self.start_recording()?;
                if let ButtonEvent::Released { duration_ms } = event {
                    // The press was never observed on its own.
                    self.finish_recording(duration_ms)?;
                }
            }
            SessionState::Recording => {
                if let Some(duration_ms) = self.record_step().await {
                    self.finish_recording(duration_ms)?;
                }
            }
            SessionState::Capturing => self.capture().await?,
            SessionState::Uploading => self.upload_and_play().await?,
            // Playback runs inside the upload step, it borrows the response.
            SessionState::Playing => {}
            SessionState::Error => {
                blink(
                    &mut self.indicator,
                    &mut self.delay,
                    self.config.error_blinks,
                    self.config.blink_ms,
                )
                .await;
                self.delay.delay_ms(self.config.error_delay_ms).await;
                self.transition(SessionEvent::ErrorShown)?;
            }
        }
        Ok(self.state)
    }

    fn transition(&mut self, event: SessionEvent) -> Result<(), TransitionError> {
        transition(&mut self.state, event)
    }

    fn fail(&mut self, event: SessionEvent, error: SessionError) -> Result<(), TransitionError> {
        self.last_error = Some(error);
        transition(&mut self.state, event)
    }

    fn start_recording(&mut self) -> Result<(), TransitionError> {
        self.record_len = WAV_HEADER_LEN.min(self.record_buffer.len());
        self.mic_done = false;
        self.transition(SessionEvent::Pressed)
    }

    /// Reads one block from the microphone unless a button event arrives
    /// first. Returns the press duration once released.
    async fn record_step(&mut self) -> Option<f64> {
        let edges = self.edges;
        let capacity = self.record_buffer.len();
        let event = if self.mic_done || self.record_len >= capacity {
            edges.wait().await
        } else {
            let end = (self.record_len + self.config.mic_read_len.max(1)).min(capacity);
            let read = self.mic.read(&mut self.record_buffer[self.record_len..end]);
            let wait = edges.wait();
            pin_mut!(read);
            pin_mut!(wait);
            match select(wait, read).await {
                Either::Left((event, _)) => event,
                Either::Right((Ok(0), _)) => {
                    log_debug!("Microphone stream ended");
                    self.mic_done = true;
                    return None;
                }
                Either::Right((Ok(len), _)) => {
                    self.record_len += len;
                    if self.record_len == capacity {
                        log_warn!("Record buffer full");
                    }
                    return None;
                }
                Either::Right((Err(e), _)) => {
                    log_error!("Microphone read failed: {:?}", e.kind());
                    self.mic_done = true;
                    return None;
                }
            }
        };

        match event {
            ButtonEvent::Released { duration_ms } => Some(duration_ms),
            ButtonEvent::Pressed => None,
        }
    }

    /// A long press without any recorded audio falls back to a snapshot.
    fn finish_recording(&mut self, duration_ms: f64) -> Result<(), TransitionError> {
        if duration_ms >= self.config.long_press_ms && self.record_len > WAV_HEADER_LEN {
            self.mode = Mode::Conversation;
            let data_len = (self.record_len - WAV_HEADER_LEN) as u32;
            let header = wav_header(data_len, &self.config.audio_format);
            self.record_buffer[..WAV_HEADER_LEN].copy_from_slice(&header);
            log_info!("Recorded {} bytes of audio", data_len);
        } else {
            if duration_ms >= self.config.long_press_ms {
                log_warn!("Long press without audio, sending a snapshot");
            }
            self.mode = Mode::Snapshot;
            self.record_len = 0;
        }
        self.transition(SessionEvent::Released)
    }

    async fn capture(&mut self) -> Result<(), TransitionError> {
        match self.client.capture_image(self.image_buffer).await {
            Ok(len) => {
                log_info!("Got {} byte image", len);
                self.image_len = len;
                self.transition(SessionEvent::CaptureSucceeded)
            }
            Err(e) => {
                log_error!("Image capture failed: {:?}", DebugFmt(&e));
                self.image_len = 0;
                let status = match e {
                    RequestError::Status(status) => Some(status),
                    _ => None,
                };
                self.fail(SessionEvent::CaptureFailed, SessionError::Camera(status))
            }
        }
    }

    async fn upload_and_play(&mut self) -> Result<(), TransitionError> {
        let audio = match self.mode {
            Mode::Conversation if self.record_len > WAV_HEADER_LEN => {
                Some(&self.record_buffer[..self.record_len])
            }
            _ => None,
        };
        let request = AnalyzeRequest {
            session_id: self.session_id.as_str(),
            mode: self.mode,
            image: &self.image_buffer[..self.image_len],
            audio,
        };
        log_info!(
            "Uploading {} byte image in {} mode",
            self.image_len,
            self.mode.as_str()
        );

        let mut response = match self.backend.analyze(request).await {
            Ok(response) => response,
            Err(e) => {
                log_error!("Upload failed: {:?}", DebugFmt(&e));
                self.last_error = Some(SessionError::Upload);
                return transition(&mut self.state, SessionEvent::UploadFailed);
            }
        };
        transition(&mut self.state, SessionEvent::ResponseReady)?;

        let mut buffer = [0u8; MAX_PLAYBACK_CHUNK];
        let chunk = self.config.playback_chunk.clamp(1, MAX_PLAYBACK_CHUNK);
        let mut skipper = HeaderSkipper::new();
        let mut played = 0usize;
        let event = loop {
            let len = match response.read(&mut buffer[..chunk]).await {
                Ok(0) => break SessionEvent::PlaybackFinished,
                Ok(len) => len,
                Err(e) => {
                    log_error!("Response read failed: {:?}", e.kind());
                    break SessionEvent::PlaybackFailed;
                }
            };
            let pcm = skipper.skip(&buffer[..len]);
            if pcm.is_empty() {
                continue;
            }
            if let Err(e) = self.speaker.write_all(pcm).await {
                log_error!("Speaker write failed: {:?}", e.kind());
                break SessionEvent::PlaybackFailed;
            }
            played += pcm.len();
        };
        drop(response);

        if event == SessionEvent::PlaybackFinished {
            if let Err(e) = self.speaker.flush().await {
                log_error!("Speaker flush failed: {:?}", e.kind());
                return self.fail(SessionEvent::PlaybackFailed, SessionError::Playback);
            }
            log_info!("Played {} bytes", played);
            self.transition(event)
        } else {
            self.fail(event, SessionError::Playback)
        }
    }
}

fn transition(state: &mut SessionState, event: SessionEvent) -> Result<(), TransitionError> {
    let next = state.next(event)?;
    log_info!("{:?} -> {:?} on {:?}", *state, next, event);
    *state = next;
    Ok(())
}
