pub mod http;
pub mod scripted;

pub use http::{HttpDetector, HttpDetectorConfig};
pub use scripted::{ScriptedDetector, ScriptedResponse};
