//! Deterministic synthetic source for `stub://` identifiers.

use image::{Rgb, RgbImage};
use url::Url;

use super::{normalize_fps, FrameSource, SourceSettings};
use crate::error::{FrameReadError, SourceOpenError};

/// Scene pattern shifts every this many frames.
const SCENE_PERIOD_FRAMES: u64 = 50;

pub struct SyntheticSource {
    name: String,
    fps: f64,
    frames: Option<u64>,
    width: u32,
    height: u32,
    frame_count: u64,
    scene_state: u8,
    closed: bool,
}

impl SyntheticSource {
    pub fn new(name: &str, settings: &SourceSettings) -> Self {
        Self {
            name: name.to_string(),
            fps: normalize_fps(settings.synthetic_fps),
            frames: settings.synthetic_frames,
            width: settings.synthetic_width,
            height: settings.synthetic_height,
            frame_count: 0,
            scene_state: 0,
            closed: false,
        }
    }

    /// Parse `stub://name?fps=..&frames=..&width=..&height=..` over `settings`.
    pub fn from_identifier(
        identifier: &str,
        settings: &SourceSettings,
    ) -> Result<Self, SourceOpenError> {
        let url = Url::parse(identifier).map_err(|e| SourceOpenError::Open {
            identifier: identifier.to_string(),
            reason: e.to_string(),
        })?;
        let name = url.host_str().unwrap_or("stub").to_string();

        let mut settings = settings.clone();
        for (key, value) in url.query_pairs() {
            let bad = |_| SourceOpenError::Open {
                identifier: identifier.to_string(),
                reason: format!("invalid {} '{}'", key, value),
            };
            match key.as_ref() {
                "fps" => settings.synthetic_fps = value.parse::<f64>().map_err(|e| bad(e.to_string()))?,
                "frames" => {
                    settings.synthetic_frames = Some(value.parse::<u64>().map_err(|e| bad(e.to_string()))?)
                }
                "width" => settings.synthetic_width = value.parse::<u32>().map_err(|e| bad(e.to_string()))?,
                "height" => {
                    settings.synthetic_height = value.parse::<u32>().map_err(|e| bad(e.to_string()))?
                }
                other => log::warn!("ignoring unknown stub parameter '{}'", other),
            }
        }

        Ok(Self::new(&name, &settings))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frames_produced(&self) -> u64 {
        self.frame_count
    }

    fn generate_frame(&mut self) -> RgbImage {
        if self.frame_count % SCENE_PERIOD_FRAMES == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let shift = self.frame_count + self.scene_state as u64;
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let base = (x as u64 * 3 + y as u64 * self.width as u64 * 3 + shift) % 256;
            Rgb([base as u8, (base + 85) as u8, (base + 170) as u8])
        })
    }
}

impl FrameSource for SyntheticSource {
    fn native_fps(&self) -> f64 {
        self.fps
    }

    fn read_next(&mut self) -> Result<Option<RgbImage>, FrameReadError> {
        if self.closed {
            return Err(FrameReadError {
                frame_index: self.frame_count,
                reason: "source closed".to_string(),
            });
        }
        if self.frames.is_some_and(|limit| self.frame_count >= limit) {
            return Ok(None);
        }
        let frame = self.generate_frame();
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
