//! gradectl-capture: Screen capture primitives for gradectl
//!
//! This crate provides the capture side of a grading cycle:
//! - Monitor enumeration, with index 0 standing for the whole virtual desktop
//! - Full-monitor and region capture with bounds checking
//! - PNG encoding and persistence of captured frames

pub mod capture;
pub mod error;
pub mod primitives;

// Re-export common types at crate root
pub use capture::{ScreenSource, XcapSource};
pub use error::{Error, Result};
pub use primitives::{
    capture, capture_with_source, encode_png, list_monitors, list_monitors_with_source,
    resolve_target, save_png, MonitorInfo, Region,
};

/// Captured frame type shared with callers.
pub use image::RgbaImage;
