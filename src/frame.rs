//! Frame model and pre-detection preprocessing.
//!
//! - `Frame`: one decoded image with its sequential index and derived stream timestamp.
//! - `resize_to_fit`: bounds the payload sent to the detector.
//!
//! Frames are owned by the stream driver for one loop iteration. Only the most
//! recently analyzed frame is retained, as the snapshot candidate.

use image::imageops::{self, FilterType};
use image::RgbImage;

/// Default upper bound for frames submitted to detection.
pub const DEFAULT_RESIZE_MAX_WIDTH: u32 = 480;
pub const DEFAULT_RESIZE_MAX_HEIGHT: u32 = 320;

/// One decoded frame.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Sequential index within the stream, starting at 0.
    pub index: u64,
    /// `index / native_fps`, in seconds of stream time.
    pub timestamp_secs: f64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, native_fps: f64, image: RgbImage) -> Self {
        Self {
            index,
            timestamp_secs: stream_timestamp(index, native_fps),
            image,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }
}

pub fn stream_timestamp(index: u64, native_fps: f64) -> f64 {
    if native_fps > 0.0 {
        index as f64 / native_fps
    } else {
        0.0
    }
}

/// Resize bounds for frames submitted to detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizeBounds {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for ResizeBounds {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_RESIZE_MAX_WIDTH,
            max_height: DEFAULT_RESIZE_MAX_HEIGHT,
        }
    }
}

/// Scale `image` down to fit within `bounds`, preserving aspect ratio.
///
/// Images already inside the bounds are returned unchanged.
pub fn resize_to_fit(image: RgbImage, bounds: ResizeBounds) -> RgbImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image;
    }
    if width <= bounds.max_width && height <= bounds.max_height {
        return image;
    }

    let scale = f64::min(
        bounds.max_width as f64 / width as f64,
        bounds.max_height as f64 / height as f64,
    );
    let new_width = ((width as f64 * scale) as u32).max(1);
    let new_height = ((height as f64 * scale) as u32).max(1);
    imageops::resize(&image, new_width, new_height, FilterType::Triangle)
}
