//! Bounded asynchronous alert delivery.
//!
//! The stream loop hands jobs to a worker thread through a fixed-capacity
//! channel. A full queue drops the job and reports it; capture never blocks on
//! storage or notification latency.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::alert::pipeline::{AlertJob, AlertPipeline, AlertSink};
use crate::error::{DeliveryFailure, DeliveryStage, EmitError};

pub const DEFAULT_DISPATCH_CAPACITY: usize = 16;

/// Counters reported when the dispatcher shuts down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
}

pub struct QueuedAlertSink {
    tx: Option<SyncSender<AlertJob>>,
    worker: Option<JoinHandle<DispatchStats>>,
    dropped: Arc<AtomicU64>,
}

impl QueuedAlertSink {
    /// Start the delivery worker. `capacity` is clamped to at least 1.
    pub fn spawn(pipeline: AlertPipeline, capacity: usize) -> Self {
        let (tx, rx) = mpsc::sync_channel::<AlertJob>(capacity.max(1));
        let worker = std::thread::spawn(move || {
            let mut stats = DispatchStats::default();
            for job in rx {
                match pipeline.deliver(&job) {
                    Ok(()) => stats.delivered += 1,
                    Err(e) => {
                        log::warn!("alert {} delivered partially: {}", job.record.frame_name, e);
                        stats.failed += 1;
                    }
                }
            }
            stats
        });

        Self {
            tx: Some(tx),
            worker: Some(worker),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Stop accepting jobs, drain the queue and return delivery counters.
    pub fn shutdown(mut self) -> DispatchStats {
        self.finish()
    }

    fn finish(&mut self) -> DispatchStats {
        self.tx.take();
        let mut stats = match self.worker.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                log::error!("alert dispatch worker panicked");
                DispatchStats::default()
            }),
            None => DispatchStats::default(),
        };
        stats.dropped = self.dropped.load(Ordering::Relaxed);
        stats
    }
}

impl AlertSink for QueuedAlertSink {
    fn submit(&self, job: AlertJob) -> Result<(), EmitError> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(queue_error("dispatch queue closed"));
        };
        match tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "alert dispatch queue full, dropping {}",
                    job.record.frame_name
                );
                Err(queue_error("dispatch queue full"))
            }
            Err(TrySendError::Disconnected(_)) => Err(queue_error("dispatch worker stopped")),
        }
    }
}

impl Drop for QueuedAlertSink {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.finish();
        }
    }
}

fn queue_error(message: &str) -> EmitError {
    EmitError {
        failures: vec![DeliveryFailure {
            stage: DeliveryStage::Queue,
            message: message.to_string(),
        }],
    }
}
