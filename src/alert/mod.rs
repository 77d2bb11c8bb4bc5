//! Violation records and their delivery.
//!
//! - `record`: the durable `ViolationRecord` and its notification text
//! - `pipeline`: persist, notify and snapshot one alert; the `emit` entry point
//! - `dispatch`: bounded background delivery

mod dispatch;
mod pipeline;
mod record;

pub use dispatch::{DispatchStats, QueuedAlertSink, DEFAULT_DISPATCH_CAPACITY};
pub use pipeline::{emit, AlertJob, AlertPipeline, AlertSink, EmitOutcome};
pub use record::{
    build_record, format_notification, frame_name, notification_subject, AlertContext,
    ViolationEntry, ViolationRecord,
};
