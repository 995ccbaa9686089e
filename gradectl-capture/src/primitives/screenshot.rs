use crate::capture::{ScreenSource, XcapSource};
use crate::error::{Error, Result};
use crate::primitives::screen::{MonitorInfo, Region};
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbaImage};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Capture a monitor (or a region of it) from the live desktop.
///
/// `monitor` 0 selects the union of all physical displays, 1 the first
/// physical display and so on. The region is in virtual-desktop coordinates
/// and must lie inside the selected monitor.
pub fn capture(monitor: usize, region: Option<Region>) -> Result<RgbaImage> {
    capture_with_source(&mut XcapSource::new(), monitor, region)
}

/// List monitors on the live desktop, index 0 (all monitors) first.
pub fn list_monitors() -> Result<Vec<MonitorInfo>> {
    list_monitors_with_source(&mut XcapSource::new())
}

pub fn list_monitors_with_source(source: &mut dyn ScreenSource) -> Result<Vec<MonitorInfo>> {
    let physical = source.monitors()?;
    let mut all = Vec::with_capacity(physical.len() + 1);
    all.push(virtual_desktop(&physical)?);
    all.extend(physical);
    Ok(all)
}

/// Capture using an explicit screen source.
///
/// Monitor and region are validated before any pixels are grabbed.
pub fn capture_with_source(
    source: &mut dyn ScreenSource,
    monitor: usize,
    region: Option<Region>,
) -> Result<RgbaImage> {
    let physical = source.monitors()?;
    let target = check_target(&physical, monitor, region)?;

    let full = if target.index == 0 {
        composite(source, &physical, target.bounds)?
    } else {
        grab_logical(source, &target)?
    };

    let img = match region {
        Some(region) => {
            let x = (region.left as i64 - target.bounds.left as i64) as u32;
            let y = (region.top as i64 - target.bounds.top as i64) as u32;
            imageops::crop_imm(&full, x, y, region.width, region.height).to_image()
        }
        None => full,
    };

    debug!(
        monitor,
        width = img.width(),
        height = img.height(),
        "Screenshot ready"
    );
    Ok(img)
}

/// Validate a monitor selector and optional region without grabbing pixels.
///
/// Returns the resolved monitor, so callers can fail fast at startup.
pub fn resolve_target(
    source: &mut dyn ScreenSource,
    monitor: usize,
    region: Option<Region>,
) -> Result<MonitorInfo> {
    let physical = source.monitors()?;
    check_target(&physical, monitor, region)
}

fn check_target(
    physical: &[MonitorInfo],
    monitor: usize,
    region: Option<Region>,
) -> Result<MonitorInfo> {
    let target = resolve_monitor(physical, monitor)?;

    if let Some(region) = region {
        if region.is_empty() || !target.bounds.contains_region(&region) {
            return Err(Error::InvalidRegion {
                region,
                bounds: target.bounds,
            });
        }
    }

    Ok(target)
}

/// Encode an image as PNG bytes
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut png_bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut png_bytes), ImageFormat::Png)?;
    Ok(png_bytes)
}

/// Write an image to `path` as PNG, creating parent directories as needed
pub fn save_png(img: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

fn virtual_desktop(physical: &[MonitorInfo]) -> Result<MonitorInfo> {
    let mut monitors = physical.iter();
    let first = monitors
        .next()
        .ok_or_else(|| Error::ScreenshotFailed("No monitors found".into()))?;
    let bounds = monitors.fold(first.bounds, |acc, m| acc.union(&m.bounds));

    Ok(MonitorInfo {
        index: 0,
        name: "all".to_string(),
        bounds,
        primary: false,
    })
}

fn resolve_monitor(physical: &[MonitorInfo], index: usize) -> Result<MonitorInfo> {
    if index == 0 {
        if physical.is_empty() {
            return Err(Error::InvalidMonitor {
                index,
                available: 0,
            });
        }
        return virtual_desktop(physical);
    }

    physical
        .get(index - 1)
        .cloned()
        .ok_or(Error::InvalidMonitor {
            index,
            available: physical.len(),
        })
}

// Grab a monitor and bring it to its logical size. HiDPI backends hand back
// physical pixels while bounds are reported in logical ones.
fn grab_logical(source: &mut dyn ScreenSource, monitor: &MonitorInfo) -> Result<RgbaImage> {
    let img = source.grab(monitor)?;
    let (width, height) = (monitor.bounds.width, monitor.bounds.height);

    if img.width() == width && img.height() == height {
        return Ok(img);
    }

    debug!(
        index = monitor.index,
        from = ?(img.width(), img.height()),
        to = ?(width, height),
        "Resizing capture to logical size"
    );
    Ok(imageops::resize(&img, width, height, FilterType::Triangle))
}

fn composite(
    source: &mut dyn ScreenSource,
    physical: &[MonitorInfo],
    bounds: Region,
) -> Result<RgbaImage> {
    let mut canvas = RgbaImage::new(bounds.width, bounds.height);

    for monitor in physical {
        let img = match grab_logical(source, monitor) {
            Ok(img) => img,
            Err(e) if physical.len() > 1 => {
                warn!(index = monitor.index, error = %e, "Skipping monitor in combined capture");
                continue;
            }
            Err(e) => return Err(e),
        };
        let x = monitor.bounds.left as i64 - bounds.left as i64;
        let y = monitor.bounds.top as i64 - bounds.top as i64;
        imageops::replace(&mut canvas, &img, x, y);
    }

    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // Requires a graphical session
    fn test_capture_live_primary() {
        let img = capture(1, None);
        if let Ok(img) = img {
            println!("Captured {}x{}", img.width(), img.height());
            assert!(img.width() > 0);
            assert!(img.height() > 0);
        }
    }

    #[test]
    #[ignore] // Requires a graphical session
    fn test_capture_live_region() {
        if let Ok(img) = capture(1, Some(Region::new(0, 0, 100, 100))) {
            assert_eq!((img.width(), img.height()), (100, 100));
        }
    }

    #[test]
    fn virtual_desktop_requires_a_monitor() {
        assert!(matches!(
            resolve_monitor(&[], 0),
            Err(Error::InvalidMonitor { index: 0, available: 0 })
        ));
    }
}
