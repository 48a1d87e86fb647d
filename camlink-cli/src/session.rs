use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use camlink_protocol::driver::clock::Clock;
use camlink_protocol::driver::indicator::Indicator;
use camlink_protocol::driver::rng::RNG;
use camlink_protocol::session::session_id::generate_session_id;
use camlink_protocol::session::wav::WAV_HEADER_LEN;
use camlink_protocol::{ButtonEdges, CameraClient, LinkConfig, Session, SessionConfig};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use log::info;
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{sleep, Instant};

use crate::create_serial::SerialLink;
use crate::file_io::{FileWriter, PacedReader, VecReader};
use crate::http_backend::{HttpBackend, DEFAULT_ANALYZE_PATH};
use crate::{Delay, SessionArgs};

/// Longest recording kept, in seconds of audio.
const MAX_RECORD_SECONDS: usize = 30;

#[derive(Clone)]
struct HostClock {
    start: Instant,
}

impl Clock for HostClock {
    fn now_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

struct HostRng;

impl RNG for HostRng {
    async fn next_bytes(&mut self, buffer: &mut [u8]) {
        rand::thread_rng().fill_bytes(buffer);
    }
}

struct ConsoleIndicator;

impl Indicator for ConsoleIndicator {
    async fn set_enable(&mut self, enable: bool) {
        info!("Indicator {}", if enable { "on" } else { "off" });
    }
}

/// Raw PCM for the simulated microphone. A WAV header, if present, is dropped.
async fn load_microphone(path: Option<&Path>) -> Result<Vec<u8>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let mut data = tokio::fs::read(path).await?;
    if data.starts_with(b"RIFF") && data.len() >= WAV_HEADER_LEN {
        data.drain(..WAV_HEADER_LEN);
    }
    Ok(data)
}

/// Runs one press, capture, upload and playback cycle against the camera on `link`.
pub async fn run_session<S: AsyncRead + AsyncWrite>(
    link: SerialLink<S>,
    link_config: LinkConfig,
    args: SessionArgs,
) -> Result<()> {
    let config = SessionConfig::default();
    if (args.hold_ms as f64) < config.debounce_ms {
        bail!("Hold time must be at least {} ms", config.debounce_ms);
    }

    let clock = HostClock {
        start: Instant::now(),
    };
    let mut device_address = [0u8; 6];
    HostRng.next_bytes(&mut device_address).await;
    let session_id = generate_session_id(&device_address, &clock, &mut HostRng)
        .await
        .map_err(|_| anyhow!("Session id does not fit"))?;

    let byte_rate = config.audio_format.byte_rate();
    let microphone = PacedReader::new(
        VecReader::new(load_microphone(args.audio.as_deref()).await?),
        byte_rate,
    );
    let speaker = FileWriter::create(&args.out).await?;
    let url = format!("{}{}", args.server.trim_end_matches('/'), DEFAULT_ANALYZE_PATH);
    let backend = HttpBackend::new(url, Duration::from_secs(args.http_timeout_s))?;

    let edges = ButtonEdges::<NoopRawMutex>::new(config.debounce_ms);
    let mut record_buffer = vec![0u8; WAV_HEADER_LEN + byte_rate as usize * MAX_RECORD_SECONDS];
    let mut image_buffer = vec![0u8; link_config.max_image_size];
    let mut session = Session::new(
        CameraClient::new(link, link_config),
        &edges,
        Delay,
        microphone,
        speaker,
        ConsoleIndicator,
        backend,
        config,
        session_id,
        &mut record_buffer,
        &mut image_buffer,
    );

    let press = async {
        edges.on_edge(true, clock.now_ms());
        sleep(Duration::from_millis(args.hold_ms)).await;
        edges.on_edge(false, clock.now_ms());
    };
    let (result, ()) = tokio::join!(session.run_cycle(), press);
    result.map_err(|e| anyhow!("Session failed: {:?}", e))?;

    println!(
        "Session {}: {} mode, {} byte image, {} byte recording, response written to {:?}",
        session.session_id(),
        session.mode().as_str(),
        session.image().len(),
        session.recorded_audio().len(),
        args.out
    );
    Ok(())
}
