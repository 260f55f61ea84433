use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::error::Result;

// Image formats the walker pairs with label files
pub const IMG_FORMATS: &[&str] = &["bmp", "jpeg", "jpg", "png", "tif", "tiff", "webp"];

// Names accepted for the class-index file, in lookup order
pub const CLASS_FILE_NAMES: &[&str] = &["class.names", "obj.names", "classes.txt"];

const BOUNDS_TOLERANCE: f64 = 1e-6;

// Precomputed HashSet of image extensions for fast lookup
pub static IMAGE_EXTENSIONS_SET: OnceLock<HashSet<String>> = OnceLock::new();

/// Get the image extensions set
pub fn get_image_extensions_set() -> &'static HashSet<String> {
    IMAGE_EXTENSIONS_SET.get_or_init(|| IMG_FORMATS.iter().map(|ext| ext.to_lowercase()).collect())
}

/// One tagged bounding box, in fractions of the image size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub tag: String,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Region {
    pub fn new(tag: impl Into<String>, left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            tag: tag.into(),
            left,
            top,
            width,
            height,
        }
    }

    /// Build from the Darknet center representation.
    pub fn from_center(
        tag: impl Into<String>,
        center_x: f64,
        center_y: f64,
        width: f64,
        height: f64,
    ) -> Self {
        Self::new(
            tag,
            center_x - width / 2.0,
            center_y - height / 2.0,
            width,
            height,
        )
    }

    pub fn center(&self) -> (f64, f64) {
        (self.left + self.width / 2.0, self.top + self.height / 2.0)
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// True when every edge lies within the unit square, allowing for the
    /// six-decimal rounding of Darknet files.
    pub fn is_within_bounds(&self) -> bool {
        let unit = -BOUNDS_TOLERANCE..=1.0 + BOUNDS_TOLERANCE;
        unit.contains(&self.left)
            && unit.contains(&self.top)
            && unit.contains(&self.right())
            && unit.contains(&self.bottom())
            && self.width >= 0.0
            && self.height >= 0.0
    }
}

/// Pixel content of a sample: either still on disk or already decoded.
#[derive(Debug, Clone)]
pub enum SampleImage {
    File(PathBuf),
    Decoded(RgbImage),
}

impl SampleImage {
    /// Decode on demand. Already-decoded pixels are borrowed.
    pub fn to_rgb(&self) -> Result<Cow<'_, RgbImage>> {
        match self {
            SampleImage::File(path) => Ok(Cow::Owned(image::open(path)?.to_rgb8())),
            SampleImage::Decoded(img) => Ok(Cow::Borrowed(img)),
        }
    }

    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            SampleImage::File(path) => Some(path),
            SampleImage::Decoded(_) => None,
        }
    }
}

/// One training example: an image and its regions.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Filename stem, also used as the output key.
    pub id: String,
    pub image: SampleImage,
    pub regions: Vec<Region>,
}

impl Sample {
    pub fn new(id: impl Into<String>, image: SampleImage, regions: Vec<Region>) -> Self {
        Self {
            id: id.into(),
            image,
            regions,
        }
    }
}

/// A tag as the training service knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTag {
    pub id: String,
    pub name: String,
}

/// A region as the training service stores it: tag id plus left/top/width/height fractions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRegion {
    pub tag_id: String,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// A tagged image fetched from the training service.
#[derive(Debug, Clone)]
pub struct ServiceImage {
    pub id: String,
    pub bytes: Vec<u8>,
    pub regions: Vec<ServiceRegion>,
}

// Struct to hold processing statistics
#[derive(Debug, Default, Clone)]
pub struct ProcessingStats {
    pub samples_read: usize,
    pub samples_written: usize,
    pub samples_failed: usize,
    pub regions_dropped: usize,
}

impl ProcessingStats {
    pub fn print_summary(&self) {
        log::info!("=== Processing Summary ===");
        log::info!("Input samples read: {}", self.samples_read);
        log::info!("Samples written: {}", self.samples_written);
        log::info!("Regions dropped at image bounds: {}", self.regions_dropped);
        if self.samples_failed > 0 {
            log::warn!("Failed input samples: {}", self.samples_failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_matches_left_top_plus_half_size() {
        let region = Region::new("cat", 0.2, 0.3, 0.1, 0.2);
        let (cx, cy) = region.center();
        assert!((cx - 0.25).abs() < 1e-12);
        assert!((cy - 0.4).abs() < 1e-12);
    }

    #[test]
    fn bounds_check_catches_overhang() {
        assert!(Region::new("a", 0.0, 0.0, 1.0, 1.0).is_within_bounds());
        assert!(!Region::new("a", 0.95, 0.95, 0.2, 0.2).is_within_bounds());
        assert!(!Region::new("a", -0.01, 0.5, 0.1, 0.1).is_within_bounds());
    }

    #[test]
    fn image_extensions_are_lowercase() {
        let set = get_image_extensions_set();
        assert!(set.contains("jpg"));
        assert!(set.contains("png"));
        assert!(!set.contains("txt"));
    }
}
