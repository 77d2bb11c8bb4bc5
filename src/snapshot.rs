//! Annotated snapshot images for alerts.
//!
//! Snapshots are written under a fixed local directory as `{name}.jpg`, where
//! `name` is the record's frame name. Names are restricted to `[A-Za-z0-9_.-]`.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use crate::detect::RawDetection;
use crate::error::StoreError;

pub const DEFAULT_SNAPSHOT_DIR: &str = "output_frames";

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: u32 = 2;
const LABEL_TAB_HEIGHT: u32 = 6;
const JPEG_QUALITY: u8 = 90;

/// Storage for annotated alert frames. Shared across streams.
pub trait SnapshotStore: Send + Sync {
    fn save(&self, name: &str, image: &RgbImage) -> Result<(), StoreError>;
}

pub struct FilesystemSnapshotStore {
    root: PathBuf,
}

impl FilesystemSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        let name = sanitize_snapshot_name(name)?;
        Ok(self.root.join(format!("{}.jpg", name)))
    }
}

impl SnapshotStore for FilesystemSnapshotStore {
    fn save(&self, name: &str, image: &RgbImage) -> Result<(), StoreError> {
        let path = self.path_for(name)?;
        let mut encoded = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY).encode_image(image)?;
        write_atomic(&path, encoded.get_ref())?;
        log::info!("saved snapshot {}", path.display());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    images: Mutex<HashMap<String, RgbImage>>,
    fail_with: Option<String>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            images: Mutex::new(HashMap::new()),
            fail_with: Some(reason.to_string()),
        }
    }

    pub fn get(&self, name: &str) -> Option<RgbImage> {
        self.images.lock().ok()?.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .images
            .lock()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn save(&self, name: &str, image: &RgbImage) -> Result<(), StoreError> {
        if let Some(reason) = &self.fail_with {
            return Err(StoreError::Unavailable(reason.clone()));
        }
        let name = sanitize_snapshot_name(name)?;
        self.images
            .lock()
            .map_err(|_| StoreError::Unavailable("snapshot lock poisoned".to_string()))?
            .insert(name, image.clone());
        Ok(())
    }
}

/// Draw every detection's box, plus a tab above it whose width scales with confidence.
pub fn annotate(image: &RgbImage, detections: &[RawDetection]) -> RgbImage {
    let mut out = image.clone();
    for detection in detections {
        draw_detection(&mut out, detection);
    }
    out
}

fn draw_detection(image: &mut RgbImage, detection: &RawDetection) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let bbox = detection.bounding_box();
    let (left_f, right_f) = (bbox.x_min.min(bbox.x_max), bbox.x_min.max(bbox.x_max));
    let (top_f, bottom_f) = (bbox.y_min.min(bbox.y_max), bbox.y_min.max(bbox.y_max));
    if !(left_f.is_finite() && right_f.is_finite() && top_f.is_finite() && bottom_f.is_finite())
        || right_f < 0.0
        || bottom_f < 0.0
        || left_f >= width as f32
        || top_f >= height as f32
    {
        return;
    }

    let x0 = clamp_coord(left_f, width);
    let x1 = clamp_coord(right_f, width);
    let y0 = clamp_coord(top_f, height);
    let y1 = clamp_coord(bottom_f, height);

    for t in 0..BOX_THICKNESS {
        let top = (y0 + t).min(y1);
        let bottom = y1.saturating_sub(t).max(y0);
        let left = (x0 + t).min(x1);
        let right = x1.saturating_sub(t).max(x0);
        for x in x0..=x1 {
            image.put_pixel(x, top, BOX_COLOR);
            image.put_pixel(x, bottom, BOX_COLOR);
        }
        for y in y0..=y1 {
            image.put_pixel(left, y, BOX_COLOR);
            image.put_pixel(right, y, BOX_COLOR);
        }
    }

    let confidence = detection.confidence.clamp(0.0, 1.0);
    let box_width = x1.saturating_sub(x0).saturating_add(1);
    let tab_width = ((box_width as f32) * confidence).round().max(1.0) as u32;
    let tab_bottom = y0;
    let tab_top = y0.saturating_sub(LABEL_TAB_HEIGHT);
    for y in tab_top..tab_bottom {
        for x in x0..(x0 + tab_width).min(width) {
            image.put_pixel(x, y, BOX_COLOR);
        }
    }
}

fn clamp_coord(value: f32, limit: u32) -> u32 {
    (value.round().max(0.0) as u32).min(limit - 1)
}

fn sanitize_snapshot_name(name: &str) -> Result<String, StoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed.starts_with('.')
        || !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}
