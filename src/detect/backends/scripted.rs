use std::collections::VecDeque;

use image::RgbImage;

use crate::detect::backend::DetectionAdapter;
use crate::detect::result::RawDetection;
use crate::error::DetectionError;

/// One scripted response.
#[derive(Clone, Debug)]
pub enum ScriptedResponse {
    Detections(Vec<RawDetection>),
    Failure(String),
}

/// Detector that replays scripted responses. No network, no model.
///
/// Responses are consumed in order; once the script runs out the fallback
/// response is returned for every further call.
#[derive(Clone, Debug)]
pub struct ScriptedDetector {
    script: VecDeque<ScriptedResponse>,
    fallback: ScriptedResponse,
    calls: u64,
}

impl ScriptedDetector {
    /// Always returns the same detections.
    pub fn constant(detections: Vec<RawDetection>) -> Self {
        Self {
            script: VecDeque::new(),
            fallback: ScriptedResponse::Detections(detections),
            calls: 0,
        }
    }

    /// Replays `script`, then returns no detections.
    pub fn with_script(script: Vec<ScriptedResponse>) -> Self {
        Self {
            script: script.into(),
            fallback: ScriptedResponse::Detections(Vec::new()),
            calls: 0,
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Default for ScriptedDetector {
    fn default() -> Self {
        Self::constant(Vec::new())
    }
}

impl DetectionAdapter for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn infer(&mut self, _image: &RgbImage) -> Result<Vec<RawDetection>, DetectionError> {
        self.calls += 1;
        let response = self
            .script
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match response {
            ScriptedResponse::Detections(detections) => Ok(detections),
            ScriptedResponse::Failure(reason) => Err(DetectionError::Unavailable(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_detector_replays_then_falls_back() {
        let image = RgbImage::new(4, 4);
        let person = RawDetection::new("Person", 0.9, 2.0, 2.0, 4.0, 4.0);
        let mut detector = ScriptedDetector::with_script(vec![
            ScriptedResponse::Detections(vec![person.clone()]),
            ScriptedResponse::Failure("timeout".to_string()),
        ]);

        assert_eq!(detector.infer(&image).unwrap(), vec![person]);
        assert!(detector.infer(&image).is_err());
        assert!(detector.infer(&image).unwrap().is_empty());
        assert_eq!(detector.calls(), 3);
    }
}
