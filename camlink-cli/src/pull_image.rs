use anyhow::anyhow;
use anyhow::Result;
use camlink_protocol::CameraClient;
use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{Read, Write};
use tokio::fs;

use crate::PullArgs;

/// Captures (unless told not to) and writes the transferred image to `args.host_path`.
pub async fn pull_image<T, R, D>(
    client: &mut CameraClient<T, R, D>,
    args: PullArgs,
) -> Result<usize>
where
    R: Read,
    T: Write<Error = R::Error>,
    D: DelayNs + Copy,
{
    let mut buffer = vec![0u8; client.config().max_image_size];
    let len = if args.no_capture {
        println!("Pulling latest image");
        client.fetch_image(&mut buffer).await
    } else {
        println!("Capturing");
        client.capture_image(&mut buffer).await
    }
    .map_err(|e| anyhow!("{:?}", e))?;

    fs::write(&args.host_path, &buffer[..len]).await?;
    println!("Wrote {} bytes to {:?}", len, args.host_path);
    Ok(len)
}
