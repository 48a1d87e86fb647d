use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use anyhow::Result;
use camlink_protocol::{Camera, CameraClient, LinkConfig, StoreConfig};
use clap::{Parser, Subcommand};
use camlink_protocol::image_store::MAX_LISTED_IMAGES;
use clap_num::{maybe_hex, number_range};
use create_serial::create_serial;
use dir_image_store::DirImageStore;
use directories::ProjectDirs;
use embedded_hal_async::delay::DelayNs;
use log::LevelFilter;
use pull_image::pull_image;
use session::run_session;
use tokio::time::sleep;
use tokio_serial::available_ports;

mod create_serial;
mod dir_image_store;
mod file_io;
mod http_backend;
mod pull_image;
mod session;
#[cfg(test)]
mod test_utils;

#[derive(Clone, Copy)]
pub struct Delay;

impl DelayNs for Delay {
    async fn delay_ns(&mut self, ns: u32) {
        sleep(Duration::from_nanos(ns as u64)).await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        sleep(Duration::from_millis(ms as u64)).await;
    }
}

#[derive(Parser)]
#[command(name = "camlink CLI")]
#[command(bin_name = "camlink-cli")]
struct Cli {
    serial: Option<String>,

    #[arg(long, default_value_t = 115200)]
    baud: u32,

    #[arg(long, default_value_t = 1024)]
    chunk_size: usize,

    #[arg(long, default_value_t = 512 * 1024)]
    max_image_size: usize,

    #[arg(long, short, action)]
    verbose: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List all the serial ports on the host")]
    Detect,
    Camera(CameraArgs),
    #[command(about = "Query the camera's store and capture counter")]
    Status,
    #[command(about = "Capture a new image on the camera")]
    Capture,
    #[command(about = "Delete the camera's latest image")]
    Delete,
    Pull(PullArgs),
    Send(SendArgs),
    Session(SessionArgs),
}

#[derive(clap::Args)]
#[command(about = "Act as the camera node, serving images from a directory")]
struct CameraArgs {
    /// Image captured on every Capture command
    #[arg(long)]
    source: PathBuf,
    #[arg(long)]
    dir: Option<PathBuf>,
    #[arg(long, default_value_t = 10, value_parser=max_images_parser)]
    max_images: usize,
}

#[derive(clap::Args)]
#[command(about = "Pull an image from the camera")]
struct PullArgs {
    host_path: PathBuf,
    /// Transfer the latest image instead of capturing a new one
    #[arg(long, action)]
    no_capture: bool,
}

fn byte_parser(s: &str) -> Result<u8, String> {
    maybe_hex(s)
}

fn max_images_parser(s: &str) -> Result<usize, String> {
    number_range(s, 1, MAX_LISTED_IMAGES)
}

#[derive(clap::Args)]
#[command(about = "Send a raw command frame and print the response")]
struct SendArgs {
    #[arg(value_parser=byte_parser)]
    command: u8,
    #[arg(value_parser=byte_parser)]
    payload: Vec<u8>,
}

#[derive(clap::Args)]
#[command(about = "Run one master session: press, capture, upload, playback")]
struct SessionArgs {
    /// Base URL of the analysis service
    #[arg(long)]
    server: String,
    /// How long the simulated button is held
    #[arg(long, default_value_t = 300)]
    hold_ms: u64,
    /// WAV or raw PCM played into the microphone
    #[arg(long)]
    audio: Option<PathBuf>,
    /// Where the response PCM is written
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value_t = 30)]
    http_timeout_s: u64,
}

fn default_image_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "camlink")
        .ok_or_else(|| anyhow!("No home directory, pass --dir"))?;
    Ok(dirs.data_dir().join("images"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let _ = env_logger::builder()
        .filter_level(if args.verbose {
            LevelFilter::Trace
        } else {
            LevelFilter::Info
        })
        .parse_default_env()
        .try_init();

    let link_config = LinkConfig {
        chunk_size: args.chunk_size,
        max_image_size: args.max_image_size,
        ..LinkConfig::default()
    };
    let open_link = || match &args.serial {
        Some(serial) => create_serial(serial, args.baud),
        None => Err(anyhow!("A serial port is required for this command")),
    };
    let open_client = || Ok::<_, anyhow::Error>(CameraClient::new(open_link()?, link_config));

    match args.command {
        Commands::Detect => {
            for port in available_ports()? {
                println!("{:?}", port);
            }
        }
        Commands::Camera(camera_args) => {
            let dir = match camera_args.dir {
                Some(dir) => dir,
                None => default_image_dir()?,
            };
            println!("Serving images from {:?}", dir);
            let store_config = StoreConfig {
                max_images: camera_args.max_images,
                ..StoreConfig::default()
            };
            let store = DirImageStore::new(dir, camera_args.source, store_config).await?;
            let mut camera = Camera::new(open_link()?, store, link_config);
            camera.run().await.map_err(|e| anyhow!("{:?}", e))?;
        }
        Commands::Status => {
            let status = open_client()?
                .get_status()
                .await
                .map_err(|e| anyhow!("{:?}", e))?;
            println!("{:?}", status);
        }
        Commands::Capture => {
            open_client()?
                .capture()
                .await
                .map_err(|e| anyhow!("{:?}", e))?;
            println!("Captured");
        }
        Commands::Delete => {
            open_client()?
                .delete_image()
                .await
                .map_err(|e| anyhow!("{:?}", e))?;
            println!("Deleted");
        }
        Commands::Pull(pull_args) => {
            pull_image(&mut open_client()?, pull_args).await?;
        }
        Commands::Send(SendArgs { command, payload }) => {
            let response = open_client()?
                .request(command, &payload)
                .await
                .map_err(|e| anyhow!("{:?}", e))?;
            match response.status() {
                Ok(status) => println!("{:?} {:02X?}", status, response.payload.as_slice()),
                Err(kind) => println!("0x{:02X} {:02X?}", kind, response.payload.as_slice()),
            }
        }
        Commands::Session(session_args) => {
            run_session(open_link()?, link_config, session_args).await?;
        }
    }
    Ok(())
}
