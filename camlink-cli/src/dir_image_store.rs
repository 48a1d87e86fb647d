use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use camlink_protocol::image_store::{evict_oldest, MAX_LISTED_IMAGES};
use camlink_protocol::{ImageId, ImageStore, StoreConfig};
use log::info;
use tokio::fs;

use crate::file_io::FileReader;

/// Image store on a host directory. Capturing copies `source` in as a new image.
pub struct DirImageStore {
    dir: PathBuf,
    source: PathBuf,
    config: StoreConfig,
    last_stamp: u64,
}

impl DirImageStore {
    pub async fn new(dir: PathBuf, source: PathBuf, config: StoreConfig) -> std::io::Result<Self> {
        config.validate().map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{:?}", e))
        })?;
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            source,
            config,
            last_stamp: 0,
        })
    }

    fn next_stamp(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.last_stamp = now.max(self.last_stamp + 1);
        self.last_stamp
    }

    fn is_image_name(&self, name: &str) -> bool {
        name.starts_with(self.config.prefix) && name.ends_with(self.config.extension)
    }
}

impl ImageStore for DirImageStore {
    type Error = std::io::Error;
    type Reader<'a> = FileReader;

    fn is_ready(&self) -> bool {
        self.dir.is_dir()
    }

    async fn capture(&mut self) -> Result<ImageId, Self::Error> {
        let max_images = self.config.max_images;
        evict_oldest(self, max_images).await?;

        let stamp = self.next_stamp();
        let id = self
            .config
            .image_id(stamp)
            .map_err(|_| std::io::Error::other("image name too long"))?;
        let copied = fs::copy(&self.source, self.dir.join(id.as_str())).await?;
        info!("Stored {} ({} bytes)", id, copied);
        Ok(id)
    }

    async fn open(&mut self, id: &ImageId) -> Result<FileReader, Self::Error> {
        FileReader::open(&self.dir.join(id.as_str())).await
    }

    async fn delete(&mut self, id: &ImageId) -> Result<(), Self::Error> {
        fs::remove_file(self.dir.join(id.as_str())).await
    }

    async fn list(&mut self) -> Result<heapless::Vec<ImageId, MAX_LISTED_IMAGES>, Self::Error> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if self.is_image_name(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();

        Ok(names
            .iter()
            .filter_map(|name| ImageId::try_from(name.as_str()).ok())
            .take(MAX_LISTED_IMAGES)
            .collect())
    }
}
