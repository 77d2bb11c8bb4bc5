//! Stream sources.
//!
//! A source yields decoded RGB frames in order and reports its native frame
//! rate. Identifiers select the backend:
//! - `stub://name[?fps=..&frames=..&width=..&height=..]`: deterministic synthetic frames
//! - `0`, `1`, `2`: local capture device `/dev/video{n}` (feature: ingest-ffmpeg)
//! - anything else: video file path or stream URL (feature: ingest-ffmpeg)
//!
//! Sources are opened through `open_source`, which returns a `StreamHandle`
//! that closes the capture resource when dropped.

#[cfg(feature = "ingest-ffmpeg")]
mod ffmpeg;
mod synthetic;

use std::ops::{Deref, DerefMut};

use image::RgbImage;

use crate::error::{FrameReadError, SourceOpenError};

#[cfg(feature = "ingest-ffmpeg")]
pub use ffmpeg::FfmpegSource;
pub use synthetic::SyntheticSource;

/// Frame rate assumed when a source reports none.
pub const FALLBACK_NATIVE_FPS: f64 = 30.0;

pub const STUB_SCHEME: &str = "stub://";

/// A sequential source of decoded frames. Sources stay on the thread that opened them.
pub trait FrameSource {
    fn native_fps(&self) -> f64;

    /// Next frame, or `None` at end of stream.
    fn read_next(&mut self) -> Result<Option<RgbImage>, FrameReadError>;

    /// Release the capture resource. Must be idempotent.
    fn close(&mut self);
}

/// Defaults for synthetic sources. Query parameters on the identifier override them.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceSettings {
    pub synthetic_fps: f64,
    /// `None` streams forever.
    pub synthetic_frames: Option<u64>,
    pub synthetic_width: u32,
    pub synthetic_height: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            synthetic_fps: FALLBACK_NATIVE_FPS,
            synthetic_frames: None,
            synthetic_width: 640,
            synthetic_height: 480,
        }
    }
}

/// An opened source. Closes it on drop.
pub struct StreamHandle {
    identifier: String,
    source: Box<dyn FrameSource>,
}

impl StreamHandle {
    pub fn new(identifier: impl Into<String>, source: Box<dyn FrameSource>) -> Self {
        Self {
            identifier: identifier.into(),
            source,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Native frame rate, with the fallback applied to unusable reports.
    pub fn native_fps(&self) -> f64 {
        normalize_fps(self.source.native_fps())
    }
}

impl Deref for StreamHandle {
    type Target = dyn FrameSource;

    fn deref(&self) -> &Self::Target {
        self.source.as_ref()
    }
}

impl DerefMut for StreamHandle {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.source.as_mut()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.source.close();
        log::debug!("closed source {}", self.identifier);
    }
}

/// Open the source named by `identifier`.
pub fn open_source(
    identifier: &str,
    settings: &SourceSettings,
) -> Result<StreamHandle, SourceOpenError> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return Err(SourceOpenError::Unsupported(identifier.to_string()));
    }

    if identifier.starts_with(STUB_SCHEME) {
        let source = SyntheticSource::from_identifier(identifier, settings)?;
        log::info!(
            "opened synthetic source {} ({} fps)",
            identifier,
            source.native_fps()
        );
        return Ok(StreamHandle::new(identifier, Box::new(source)));
    }

    let location = capture_device_path(identifier).unwrap_or_else(|| identifier.to_string());

    #[cfg(feature = "ingest-ffmpeg")]
    {
        let source = FfmpegSource::open(&location).map_err(|e| SourceOpenError::Open {
            identifier: identifier.to_string(),
            reason: format!("{:#}", e),
        })?;
        log::info!(
            "opened source {} via ffmpeg ({:.2} fps)",
            location,
            source.native_fps()
        );
        Ok(StreamHandle::new(identifier, Box::new(source)))
    }
    #[cfg(not(feature = "ingest-ffmpeg"))]
    {
        Err(SourceOpenError::Open {
            identifier: identifier.to_string(),
            reason: format!("decoding {} requires the ingest-ffmpeg feature", location),
        })
    }
}

/// `"0"`, `"1"`, `"2"` name local capture devices.
pub fn capture_device_path(identifier: &str) -> Option<String> {
    match identifier {
        "0" | "1" | "2" => Some(format!("/dev/video{}", identifier)),
        _ => None,
    }
}

pub fn normalize_fps(fps: f64) -> f64 {
    if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        FALLBACK_NATIVE_FPS
    }
}
