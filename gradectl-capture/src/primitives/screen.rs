//! Screen geometry primitives.
//!
//! This module provides the [`Region`] and [`MonitorInfo`] types. All
//! coordinates are virtual-desktop pixels, so a secondary monitor placed to the
//! right of a 1920 pixel wide primary starts at `left = 1920`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A rectangular region on the screen
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> i64 {
        self.left as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.top as i64 + self.height as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Check if a point is within the region
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && (x as i64) < self.right() && y >= self.top && (y as i64) < self.bottom()
    }

    /// Check if `other` lies entirely inside this region
    pub fn contains_region(&self, other: &Region) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Smallest region covering both `self` and `other`
    pub fn union(&self, other: &Region) -> Region {
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Region {
            left,
            top,
            width: (right - left as i64) as u32,
            height: (bottom - top as i64) as u32,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.left, self.top, self.width, self.height)
    }
}

/// Parses `left,top,width,height`.
impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err("Region must be left,top,width,height".to_string());
        }
        let left = parts[0].parse().map_err(|_| "Invalid left".to_string())?;
        let top = parts[1].parse().map_err(|_| "Invalid top".to_string())?;
        let width = parts[2].parse().map_err(|_| "Invalid width".to_string())?;
        let height = parts[3].parse().map_err(|_| "Invalid height".to_string())?;
        let region = Region::new(left, top, width, height);
        if region.is_empty() {
            return Err("Region width and height must be greater than zero".to_string());
        }
        Ok(region)
    }
}

/// A monitor as seen by the capture layer. Index 0 is the union of all
/// physical monitors, physical monitors start at 1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitorInfo {
    pub index: usize,
    pub name: String,
    pub bounds: Region,
    pub primary: bool,
}
