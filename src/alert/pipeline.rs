use std::sync::Arc;

use image::RgbImage;

use crate::alert::record::{
    build_record, format_notification, notification_subject, AlertContext, ViolationRecord,
};
use crate::detect::RawDetection;
use crate::error::{DeliveryFailure, DeliveryStage, EmitError};
use crate::notify::{Notification, Notifier};
use crate::pipeline::{CurrentResult, StreamState};
use crate::snapshot::{annotate, SnapshotStore};
use crate::storage::ViolationStore;

/// Everything needed to deliver one alert after the record has been built.
#[derive(Clone, Debug)]
pub struct AlertJob {
    pub record: ViolationRecord,
    /// The analyzed (resized) frame the detections refer to.
    pub image: RgbImage,
    pub detections: Vec<RawDetection>,
}

/// Receives alert jobs from the stream driver.
pub trait AlertSink: Send {
    fn submit(&self, job: AlertJob) -> Result<(), EmitError>;
}

impl<T: AlertSink + ?Sized> AlertSink for Box<T> {
    fn submit(&self, job: AlertJob) -> Result<(), EmitError> {
        (**self).submit(job)
    }
}

/// Outcome of an alert attempt that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmitOutcome {
    Emitted,
    /// The carried-forward result had no person that satisfies `should_log`.
    NothingToReport,
}

/// Persist, notify, snapshot. Each stage runs even if an earlier one failed.
pub struct AlertPipeline {
    store: Arc<dyn ViolationStore>,
    notifier: Arc<dyn Notifier>,
    snapshots: Arc<dyn SnapshotStore>,
}

impl AlertPipeline {
    pub fn new(
        store: Arc<dyn ViolationStore>,
        notifier: Arc<dyn Notifier>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            store,
            notifier,
            snapshots,
        }
    }

    /// Run delivery stages for one job. Failures are logged and collected, never retried.
    pub fn deliver(&self, job: &AlertJob) -> Result<(), EmitError> {
        let record = &job.record;
        let mut failures = Vec::new();

        match self.store.insert(record) {
            Ok(()) => log::info!(
                "stored violation record {} ({} violator(s))",
                record.frame_name,
                record.violations.len()
            ),
            Err(e) => {
                log::warn!("dropping violation record {}: {}", record.frame_name, e);
                failures.push(DeliveryFailure {
                    stage: DeliveryStage::Store,
                    message: e.to_string(),
                });
            }
        }

        let notification = Notification {
            camera_id: record.camera_id.clone(),
            site: record.site.clone(),
            subject: notification_subject(record),
            body: format_notification(record),
        };
        if let Err(e) = self.notifier.send(&notification) {
            log::warn!(
                "{} notification for {} failed: {}",
                self.notifier.name(),
                record.frame_name,
                e
            );
            failures.push(DeliveryFailure {
                stage: DeliveryStage::Notify,
                message: e.to_string(),
            });
        }

        let annotated = annotate(&job.image, &job.detections);
        if let Err(e) = self.snapshots.save(&record.frame_name, &annotated) {
            log::warn!("snapshot {} not saved: {}", record.frame_name, e);
            failures.push(DeliveryFailure {
                stage: DeliveryStage::Snapshot,
                message: e.to_string(),
            });
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(EmitError { failures })
        }
    }
}

impl AlertSink for AlertPipeline {
    fn submit(&self, job: AlertJob) -> Result<(), EmitError> {
        self.deliver(&job)
    }
}

/// Build the record for the current frame and hand it to `sink`.
///
/// Called when the throttle gate is open. `last_logged_frame` advances whenever
/// an alert was attempted, whether or not delivery succeeded.
pub fn emit<S: AlertSink + ?Sized>(
    sink: &S,
    state: &mut StreamState,
    current: &CurrentResult,
    ctx: &AlertContext,
) -> Result<EmitOutcome, EmitError> {
    let Some(record) = build_record(ctx, state.timestamp_secs(), &current.result) else {
        return Ok(EmitOutcome::NothingToReport);
    };

    log::info!(
        "alert at frame {} ({:.2}s): {} violator(s), analysis from frame {} ({} frame(s) old)",
        state.frame_index,
        record.video_timestamp_seconds,
        record.violations.len(),
        current.analyzed_frame,
        current.staleness_frames(state.frame_index)
    );

    let job = AlertJob {
        record,
        image: current.image.clone(),
        detections: current.detections.clone(),
    };
    let outcome = sink.submit(job);
    state.record_emission();
    outcome.map(|()| EmitOutcome::Emitted)
}
