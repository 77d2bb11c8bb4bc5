mod backend;
mod backends;
mod result;

pub use backend::DetectionAdapter;
pub use backends::{HttpDetector, HttpDetectorConfig, ScriptedDetector, ScriptedResponse};
pub use result::{retain_well_formed, BoundingBox, RawDetection, PERSON_CLASS};
