pub mod desktop;

use crate::primitives::MonitorInfo;
use crate::Result;
use image::RgbaImage;

pub use desktop::XcapSource;

/// Backend that can enumerate physical monitors and grab their pixels.
pub trait ScreenSource {
    /// Physical monitors in platform order, indexed from 1.
    fn monitors(&mut self) -> Result<Vec<MonitorInfo>>;

    /// Grab the full contents of one physical monitor.
    fn grab(&mut self, monitor: &MonitorInfo) -> Result<RgbaImage>;
}
