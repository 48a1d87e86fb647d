#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

#[macro_use]
mod fmt;

pub use button::{ButtonEdges, ButtonEvent};
pub use camera::Camera;
pub use codec::{CommandId, Frame, StatusCode};
pub use config::{LinkConfig, SessionConfig, StoreConfig};
pub use image_store::{ImageId, ImageStore};
pub use link::{Link, LinkError};
pub use master::{CameraClient, CameraStatus, RequestError};
pub use session::{Session, SessionError};
pub use transfer::{send_image, ImageReceiver, TransferError};

pub mod button;
pub mod camera;
pub mod checksum;
pub mod chunk;
pub mod codec;
pub mod config;
pub mod driver;
pub mod image_store;
pub mod link;
pub mod master;
pub mod receiver;
pub mod session;
pub mod transfer;
mod utils;

#[cfg(test)]
mod test_utils;
