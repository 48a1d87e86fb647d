use core::fmt::Debug;

use embedded_io_async::{Read, Seek};
use heapless::{String, Vec};

pub type ImageId = String<32>;

/// Upper bound on the number of entries `list` reports.
pub const MAX_LISTED_IMAGES: usize = 64;

/// Persistent image storage on the camera node, typically an SD card.
///
/// `list` returns entries oldest first. Implementations bound their size by
/// calling [`evict_oldest`] from `capture`.
pub trait ImageStore {
    type Error: Debug;
    type Reader<'a>: Read + Seek
    where
        Self: 'a;

    fn is_ready(&self) -> bool;

    /// Captures a frame and stores it as a new image.
    async fn capture(&mut self) -> Result<ImageId, Self::Error>;

    async fn open(&mut self, id: &ImageId) -> Result<Self::Reader<'_>, Self::Error>;

    async fn delete(&mut self, id: &ImageId) -> Result<(), Self::Error>;

    async fn list(&mut self) -> Result<Vec<ImageId, MAX_LISTED_IMAGES>, Self::Error>;
}

/// Deletes the oldest images until one more fits under `max_images`.
/// Returns how many were deleted. `max_images` is clamped to
/// `1..=MAX_LISTED_IMAGES`, since only that many entries are ever listed.
pub async fn evict_oldest<S: ImageStore>(store: &mut S, max_images: usize) -> Result<usize, S::Error> {
    let images = store.list().await?;
    let keep = max_images.clamp(1, MAX_LISTED_IMAGES) - 1;
    let excess = images.len().saturating_sub(keep);
    for id in images.iter().take(excess) {
        log_info!("Evicting image {}", id.as_str());
        store.delete(id).await?;
    }
    Ok(excess)
}
