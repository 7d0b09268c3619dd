//! Screen captures and geometry for the fusion pipeline.
//!
//! This module provides:
//! - `Region` bounding boxes with overlap measures (IoU, containment, position delta)
//! - `Screenshot` encoded image payloads handed to detectors and providers
//! - The `ScreenCapture` capability trait implemented by platform backends

use crate::capability::CapabilityResult;
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// A rectangular region on the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Region {
    /// X coordinate of the top-left corner
    pub x: i32,
    /// Y coordinate of the top-left corner
    pub y: i32,
    /// Width of the region
    pub width: u32,
    /// Height of the region
    pub height: u32,
}

impl Region {
    /// Create a new region.
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Check if this region is valid (has positive dimensions).
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Area in square pixels.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Check if a point is within this region.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x
            && x < self.x + self.width as i32
            && y >= self.y
            && y < self.y + self.height as i32
    }

    /// Get the center point of this region.
    pub fn center(&self) -> (i32, i32) {
        (
            self.x + (self.width / 2) as i32,
            self.y + (self.height / 2) as i32,
        )
    }

    /// Area of the intersection with another region.
    pub fn intersection_area(&self, other: &Region) -> u64 {
        let left = self.x.max(other.x) as i64;
        let top = self.y.max(other.y) as i64;
        let right = (self.x as i64 + self.width as i64).min(other.x as i64 + other.width as i64);
        let bottom = (self.y as i64 + self.height as i64).min(other.y as i64 + other.height as i64);

        if right <= left || bottom <= top {
            return 0;
        }
        ((right - left) * (bottom - top)) as u64
    }

    /// Intersection over union, 0.0 when either region is empty.
    pub fn iou(&self, other: &Region) -> f64 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;
        if union == 0 {
            return 0.0;
        }
        intersection as f64 / union as f64
    }

    /// Intersection divided by the smaller of the two areas.
    ///
    /// Used to attach text regions to elements, where a small label fully
    /// inside a large button should count as a full match.
    pub fn overlap_ratio(&self, other: &Region) -> f64 {
        let smaller = self.area().min(other.area());
        if smaller == 0 {
            return 0.0;
        }
        self.intersection_area(other) as f64 / smaller as f64
    }

    /// True when both top-left coordinates are within `threshold` pixels.
    pub fn is_near(&self, other: &Region, threshold: u32) -> bool {
        (self.x - other.x).unsigned_abs() < threshold && (self.y - other.y).unsigned_abs() < threshold
    }
}

/// Image format of an encoded capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
}

impl ImageFormat {
    /// Get the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }
}

/// An encoded screenshot.
#[derive(Debug, Clone)]
pub struct Screenshot {
    /// Encoded image bytes
    pub data: Vec<u8>,
    /// Encoding of `data`
    pub format: ImageFormat,
    /// Captured area in screen coordinates
    pub region: Region,
    /// Timestamp of capture (Unix milliseconds)
    pub timestamp: i64,
    /// Source of the capture (monitor name, device id, etc.)
    pub source: String,
}

impl Screenshot {
    /// Create a new screenshot from encoded bytes.
    pub fn new(data: Vec<u8>, format: ImageFormat, region: Region, source: impl Into<String>) -> Self {
        Self {
            data,
            format,
            region,
            timestamp: chrono::Utc::now().timestamp_millis(),
            source: source.into(),
        }
    }

    /// Get the width of the screenshot.
    pub fn width(&self) -> u32 {
        self.region.width
    }

    /// Get the height of the screenshot.
    pub fn height(&self) -> u32 {
        self.region.height
    }

    /// Whether the payload carries any image data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Base64 encoding of the payload.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// `data:` URL suitable for vision chat APIs.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.format.mime_type(), self.to_base64())
    }
}

/// Platform screen capture backend.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    /// Capture the current screen.
    async fn capture(&self) -> CapabilityResult<Screenshot>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_contains_and_center() {
        let region = Region::new(10, 20, 100, 50);
        assert!(region.contains(10, 20));
        assert!(region.contains(109, 69));
        assert!(!region.contains(110, 20));
        assert_eq!(region.center(), (60, 45));
    }

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = Region::new(0, 0, 100, 100);
        assert!((a.iou(&a) - 1.0).abs() < 1e-9);

        let b = Region::new(200, 200, 50, 50);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = Region::new(0, 0, 100, 100);
        let b = Region::new(50, 0, 100, 100);
        // intersection 5000, union 15000
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_overlap_ratio_uses_smaller_area() {
        let button = Region::new(0, 0, 200, 40);
        let label = Region::new(10, 10, 50, 20);
        assert!((button.overlap_ratio(&label) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_region_overlap_is_zero() {
        let empty = Region::new(0, 0, 0, 0);
        let other = Region::new(0, 0, 10, 10);
        assert_eq!(empty.iou(&other), 0.0);
        assert_eq!(empty.overlap_ratio(&other), 0.0);
        assert!(!empty.is_valid());
    }

    #[test]
    fn test_is_near() {
        let a = Region::new(100, 100, 10, 10);
        assert!(a.is_near(&Region::new(140, 60, 5, 5), 50));
        assert!(!a.is_near(&Region::new(150, 100, 5, 5), 50));
    }

    #[test]
    fn test_data_url() {
        let shot = Screenshot::new(vec![1, 2, 3], ImageFormat::Png, Region::new(0, 0, 1, 1), "test");
        assert_eq!(shot.to_data_url(), "data:image/png;base64,AQID");
        assert!(!shot.is_empty());
    }
}
