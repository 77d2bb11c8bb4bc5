//! PPE Watch
//!
//! Watches a video stream for people missing required protective gear and
//! turns sustained violations into throttled, persisted alerts.
//!
//! # Architecture
//!
//! Each stream runs one sequential loop:
//!
//! 1. **Sample**: every `sample_interval_frames`-th frame goes to detection.
//! 2. **Detect**: an injected `DetectionAdapter` returns raw boxes.
//! 3. **Aggregate**: gear boxes whose center falls inside a person box count as worn.
//! 4. **Evaluate**: persons missing any required class are violators.
//! 5. **Throttle**: at most one alert per `log_interval_frames`, checked on every frame.
//! 6. **Alert**: persist the record, notify and save an annotated snapshot.
//!
//! Detection and delivery failures never stop the stream. Only failing to open
//! the source or to read from it does.
//!
//! # Module Structure
//!
//! - `frame`: frame model and resize-before-detect
//! - `ingest`: stream sources (synthetic, FFmpeg)
//! - `detect`: detection boundary, hosted HTTP detector, scripted detector
//! - `pipeline`: sampler, aggregator, compliance evaluator, throttle, stream state
//! - `alert`: violation records, delivery pipeline, bounded dispatch queue
//! - `storage`, `snapshot`, `notify`: delivery collaborators
//! - `driver`: the per-stream state machine
//! - `config`: file + environment configuration

pub mod alert;
pub mod config;
pub mod detect;
pub mod driver;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod notify;
pub mod pipeline;
pub mod snapshot;
pub mod storage;

pub use alert::{
    emit, AlertContext, AlertJob, AlertPipeline, AlertSink, EmitOutcome, QueuedAlertSink,
    ViolationEntry, ViolationRecord,
};
pub use config::MonitorConfig;
pub use detect::{DetectionAdapter, HttpDetector, RawDetection, ScriptedDetector};
pub use driver::{DriverSettings, FrameSink, LogSink, StreamDriver, StreamPhase, StreamSummary};
pub use error::{
    DetectionError, EmitError, FrameReadError, NotifyError, SourceOpenError, StoreError,
};
pub use frame::{Frame, ResizeBounds};
pub use ingest::{open_source, FrameSource, SourceSettings, StreamHandle};
pub use notify::{LogNotifier, MqttNotifier, Notification, Notifier};
pub use pipeline::{
    evaluate, should_analyze, should_emit, should_log, FrameResult, Person, RequiredClasses,
    SafetyGear, StreamState,
};
pub use snapshot::{FilesystemSnapshotStore, SnapshotStore};
pub use storage::{SqliteViolationStore, ViolationStore};
