//! Live desktop capture through `xcap`.

use crate::capture::ScreenSource;
use crate::error::{Error, Result};
use crate::primitives::{MonitorInfo, Region};
use image::RgbaImage;
use tracing::{debug, trace};
use xcap::Monitor;

/// Screen source backed by the platform capture API (X11/Wayland, macOS, Windows).
#[derive(Debug, Default, Clone, Copy)]
pub struct XcapSource;

impl XcapSource {
    pub fn new() -> Self {
        Self
    }

    fn platform_monitors() -> Result<Vec<Monitor>> {
        Monitor::all()
            .map_err(|e| Error::ScreenshotFailed(format!("Failed to enumerate monitors: {}", e)))
    }
}

impl ScreenSource for XcapSource {
    fn monitors(&mut self) -> Result<Vec<MonitorInfo>> {
        let monitors = Self::platform_monitors()?;
        let mut infos = Vec::with_capacity(monitors.len());

        for (i, monitor) in monitors.iter().enumerate() {
            let bounds = Region::new(
                monitor.x().map_err(query_failed("x"))?,
                monitor.y().map_err(query_failed("y"))?,
                monitor.width().map_err(query_failed("width"))?,
                monitor.height().map_err(query_failed("height"))?,
            );
            let name = monitor.name().unwrap_or_else(|_| format!("monitor-{}", i + 1));
            let primary = monitor.is_primary().unwrap_or(false);
            trace!(index = i + 1, name = %name, bounds = %bounds, primary, "Found monitor");

            infos.push(MonitorInfo {
                index: i + 1,
                name,
                bounds,
                primary,
            });
        }

        Ok(infos)
    }

    fn grab(&mut self, monitor: &MonitorInfo) -> Result<RgbaImage> {
        // Handles are not kept between calls; look the monitor up again.
        let monitors = Self::platform_monitors()?;
        let available = monitors.len();
        let target = monitors
            .into_iter()
            .nth(monitor.index.saturating_sub(1))
            .ok_or(Error::InvalidMonitor {
                index: monitor.index,
                available,
            })?;

        let image = target.capture_image().map_err(|e| {
            Error::ScreenshotFailed(format!(
                "Failed to capture monitor {}: {}",
                monitor.index, e
            ))
        })?;
        debug!(
            index = monitor.index,
            width = image.width(),
            height = image.height(),
            "Captured monitor"
        );
        Ok(image)
    }
}

fn query_failed(field: &'static str) -> impl Fn(xcap::XCapError) -> Error {
    move |e| Error::ScreenshotFailed(format!("Failed to read monitor {}: {}", field, e))
}
