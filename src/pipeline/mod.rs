//! Sampling, aggregation and throttling core.
//!
//! - `sampler`: which frames go to detection
//! - `aggregate`: detections to persons with gear presence
//! - `compliance`: violators per frame and the `should_log` predicate
//! - `throttle`: minimum frame gap between alerts
//! - `state`: per-stream counters and the carried-forward analysis result

pub mod aggregate;
pub mod compliance;
mod model;
pub mod sampler;
mod state;
pub mod throttle;

pub use aggregate::{aggregate_persons, analyze_safety_gear};
pub use compliance::{evaluate, should_log};
pub use model::{FrameResult, Person, RequiredClasses, SafetyGear};
pub use sampler::{sample_interval_frames, should_analyze};
pub use state::{CurrentResult, StreamState};
pub use throttle::{log_interval_frames, should_emit};
