//! Error taxonomy for the monitoring pipeline.
//!
//! Only `SourceOpenError` and `FrameReadError` end a stream. Everything else is
//! isolated to the frame or alert that produced it and reported through the log.

use std::fmt;

use thiserror::Error;

/// The stream source could not be opened. Fatal to that stream.
#[derive(Error, Debug)]
pub enum SourceOpenError {
    #[error("unsupported source '{0}'")]
    Unsupported(String),

    #[error("failed to open source '{identifier}': {reason}")]
    Open { identifier: String, reason: String },
}

/// Reading from an opened source failed in a way the stream cannot recover from.
#[derive(Error, Debug)]
#[error("frame read failed at frame {frame_index}: {reason}")]
pub struct FrameReadError {
    pub frame_index: u64,
    pub reason: String,
}

/// The external detection model could not produce detections for a frame.
///
/// Recoverable: the frame is treated as having no detections.
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("detection unavailable: {0}")]
    Unavailable(String),

    #[error("malformed detection response: {0}")]
    Malformed(String),

    #[error("failed to encode frame for detection: {0}")]
    Encode(String),
}

/// Persistence or snapshot storage failed.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid snapshot name '{0}'")]
    InvalidName(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Notification dispatch failed.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),

    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Delivery stage of an alert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryStage {
    Store,
    Notify,
    Snapshot,
    Queue,
}

impl fmt::Display for DeliveryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeliveryStage::Store => "store",
            DeliveryStage::Notify => "notify",
            DeliveryStage::Snapshot => "snapshot",
            DeliveryStage::Queue => "queue",
        };
        f.write_str(name)
    }
}

/// One failed stage of an alert delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub stage: DeliveryStage,
    pub message: String,
}

/// An alert was attempted but at least one delivery stage failed.
///
/// Failed stages are not retried and do not roll back stages that succeeded.
#[derive(Error, Debug)]
#[error("alert delivery failed for {}", describe(.failures))]
pub struct EmitError {
    pub failures: Vec<DeliveryFailure>,
}

impl EmitError {
    pub fn failed(&self, stage: DeliveryStage) -> bool {
        self.failures.iter().any(|f| f.stage == stage)
    }
}

fn describe(failures: &[DeliveryFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.stage, f.message))
        .collect::<Vec<_>>()
        .join(", ")
}
