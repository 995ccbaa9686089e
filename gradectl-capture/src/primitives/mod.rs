//! Low-level primitives for screen capture.
//!
//! This module contains the [`Region`] and [`MonitorInfo`] data structures and
//! the capture functions built on top of a [`crate::ScreenSource`].

pub mod screen;
pub mod screenshot;

pub use screen::{MonitorInfo, Region};
pub use screenshot::{
    capture, capture_with_source, encode_png, list_monitors, list_monitors_with_source,
    resolve_target, save_png,
};
