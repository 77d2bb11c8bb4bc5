use image::RgbImage;

use crate::detect::result::RawDetection;
use crate::error::DetectionError;

/// Boundary to the external object-detection model.
///
/// Implementations receive the (already resized) frame and return the raw boxes
/// the model produced. Any failure surfaces as a `DetectionError`; callers treat
/// it the same as an empty result for that frame.
pub trait DetectionAdapter: Send {
    /// Adapter identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn infer(&mut self, image: &RgbImage) -> Result<Vec<RawDetection>, DetectionError>;

    /// Optional warm-up hook, called once before the stream loop starts.
    fn warm_up(&mut self) -> Result<(), DetectionError> {
        Ok(())
    }
}

impl<T: DetectionAdapter + ?Sized> DetectionAdapter for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn infer(&mut self, image: &RgbImage) -> Result<Vec<RawDetection>, DetectionError> {
        (**self).infer(image)
    }

    fn warm_up(&mut self) -> Result<(), DetectionError> {
        (**self).warm_up()
    }
}
