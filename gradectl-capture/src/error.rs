//! Error types for gradectl-capture.

use crate::primitives::Region;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid monitor {index}: {available} physical monitor(s) available (0 selects all)")]
    InvalidMonitor { index: usize, available: usize },

    #[error("Invalid region {region}: must be non-empty and inside monitor bounds {bounds}")]
    InvalidRegion { region: Region, bounds: Region },

    #[error("Screenshot failed: {0}")]
    ScreenshotFailed(String),

    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
