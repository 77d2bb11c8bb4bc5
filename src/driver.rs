//! Per-stream loop.
//!
//! `StreamDriver` owns one stream from open to close:
//! 1. Reads frames in order from the source
//! 2. Sends every `sample_interval_frames`-th frame through detection and evaluation
//! 3. Carries the latest analysis forward as the current result
//! 4. Checks the throttle gate on every frame and emits an alert when it is
//!    open and the current result has violators
//!
//! Only source-open and frame-read failures end the stream. Detection and
//! delivery failures are logged and counted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::alert::{emit, AlertContext, AlertSink, EmitOutcome};
use crate::detect::{retain_well_formed, DetectionAdapter, RawDetection};
use crate::frame::{resize_to_fit, Frame, ResizeBounds};
use crate::ingest::{open_source, SourceSettings, StreamHandle};
use crate::pipeline::{evaluate, CurrentResult, FrameResult, StreamState};

const HEALTH_LOG_PERIOD: Duration = Duration::from_secs(5);

/// Lifecycle of one stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamPhase {
    Opening,
    Streaming,
    /// End of stream or stop requested.
    Closed,
    /// Source could not be opened, or a read failed.
    Error,
}

/// Optional observer of analyzed frames (display, recording, metrics).
///
/// The loop never waits on it for anything other than the call itself.
pub trait FrameSink: Send {
    fn on_analyzed(&mut self, frame: &Frame, detections: &[RawDetection], result: &FrameResult);
}

/// Logs a one-line summary of each analyzed frame at debug level.
#[derive(Debug, Default)]
pub struct LogSink;

impl FrameSink for LogSink {
    fn on_analyzed(&mut self, frame: &Frame, detections: &[RawDetection], result: &FrameResult) {
        let labels: Vec<String> = detections.iter().map(RawDetection::label).collect();
        log::debug!(
            "frame {} ({:.2}s): [{}] persons={} violating={}",
            frame.index,
            frame.timestamp_secs,
            labels.join(", "),
            result.persons_detected,
            result.total_violating_persons
        );
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DriverSettings {
    pub target_analysis_fps: f64,
    pub log_period_seconds: f64,
    pub resize: ResizeBounds,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            target_analysis_fps: 3.0,
            log_period_seconds: 5.0,
            resize: ResizeBounds::default(),
        }
    }
}

/// Counters reported when a stream ends.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamSummary {
    pub frames_read: u64,
    pub frames_analyzed: u64,
    pub detection_failures: u64,
    pub alerts_emitted: u64,
    pub alert_failures: u64,
    pub phase: StreamPhase,
    /// Reason for an `Error` phase.
    pub error: Option<String>,
}

impl StreamSummary {
    fn new() -> Self {
        Self {
            frames_read: 0,
            frames_analyzed: 0,
            detection_failures: 0,
            alerts_emitted: 0,
            alert_failures: 0,
            phase: StreamPhase::Opening,
            error: None,
        }
    }
}

pub struct StreamDriver {
    detector: Box<dyn DetectionAdapter>,
    sink: Box<dyn AlertSink>,
    context: AlertContext,
    settings: DriverSettings,
    frame_sink: Option<Box<dyn FrameSink>>,
    stop: Arc<AtomicBool>,
    phase: StreamPhase,
}

impl StreamDriver {
    pub fn new(
        detector: Box<dyn DetectionAdapter>,
        sink: Box<dyn AlertSink>,
        context: AlertContext,
        settings: DriverSettings,
    ) -> Self {
        Self {
            detector,
            sink,
            context,
            settings,
            frame_sink: None,
            stop: Arc::new(AtomicBool::new(false)),
            phase: StreamPhase::Opening,
        }
    }

    pub fn with_frame_sink(mut self, frame_sink: Box<dyn FrameSink>) -> Self {
        self.frame_sink = Some(frame_sink);
        self
    }

    /// Flag checked between frames. Setting it closes the stream after the current frame.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Consume the driver and hand back the alert sink (e.g. to drain a queue).
    pub fn into_sink(self) -> Box<dyn AlertSink> {
        self.sink
    }

    /// Open `identifier` and run it to completion.
    pub fn run(&mut self, identifier: &str, source_settings: &SourceSettings) -> StreamSummary {
        self.phase = StreamPhase::Opening;
        match open_source(identifier, source_settings) {
            Ok(handle) => self.run_stream(handle),
            Err(e) => {
                log::error!("stream {} failed to open: {}", identifier, e);
                self.phase = StreamPhase::Error;
                let mut summary = StreamSummary::new();
                summary.phase = StreamPhase::Error;
                summary.error = Some(e.to_string());
                summary
            }
        }
    }

    /// Run an already opened source. The handle is closed when this returns.
    pub fn run_stream(&mut self, mut handle: StreamHandle) -> StreamSummary {
        let mut summary = StreamSummary::new();

        if let Err(e) = self.detector.warm_up() {
            log::warn!("detector {} warm-up failed: {}", self.detector.name(), e);
        }

        let native_fps = handle.native_fps();
        let mut state = StreamState::new(
            native_fps,
            self.settings.target_analysis_fps,
            self.settings.log_period_seconds,
        );
        let mut current: Option<CurrentResult> = None;

        self.phase = StreamPhase::Streaming;
        log::info!(
            "stream {} open: native_fps={:.2} sample_interval={} log_interval={} detector={}",
            handle.identifier(),
            native_fps,
            state.sample_interval_frames,
            state.log_interval_frames,
            self.detector.name()
        );

        let mut last_health_log = Instant::now();
        loop {
            if self.stop.load(Ordering::SeqCst) {
                log::info!("stream {} stop requested", handle.identifier());
                self.phase = StreamPhase::Closed;
                break;
            }

            let image = match handle.read_next() {
                Ok(Some(image)) => image,
                Ok(None) => {
                    log::info!("stream {} ended", handle.identifier());
                    self.phase = StreamPhase::Closed;
                    break;
                }
                Err(e) => {
                    log::error!("stream {}: {}", handle.identifier(), e);
                    self.phase = StreamPhase::Error;
                    summary.error = Some(e.to_string());
                    break;
                }
            };
            summary.frames_read += 1;

            if state.should_analyze() {
                let frame = Frame::new(state.frame_index, native_fps, image);
                current = Some(self.analyze(frame, &mut summary));
            }

            if state.gate_open() {
                if let Some(current) = current.as_ref() {
                    self.maybe_emit(&mut state, current, &mut summary);
                }
            }

            state.advance();

            if last_health_log.elapsed() >= HEALTH_LOG_PERIOD {
                log::info!(
                    "stream {} frames={} analyzed={} alerts={} detection_failures={}",
                    handle.identifier(),
                    summary.frames_read,
                    summary.frames_analyzed,
                    summary.alerts_emitted,
                    summary.detection_failures
                );
                last_health_log = Instant::now();
            }
        }

        summary.phase = self.phase;
        log::info!(
            "stream {} closed: phase={:?} frames={} analyzed={} alerts={}",
            handle.identifier(),
            summary.phase,
            summary.frames_read,
            summary.frames_analyzed,
            summary.alerts_emitted
        );
        summary
    }

    fn analyze(&mut self, frame: Frame, summary: &mut StreamSummary) -> CurrentResult {
        summary.frames_analyzed += 1;
        let Frame {
            index,
            timestamp_secs,
            image,
        } = frame;
        let analyzed = Frame {
            index,
            timestamp_secs,
            image: resize_to_fit(image, self.settings.resize),
        };

        let detections = if analyzed.is_empty() {
            Vec::new()
        } else {
            match self.detector.infer(&analyzed.image) {
                Ok(detections) => retain_well_formed(detections),
                Err(e) => {
                    summary.detection_failures += 1;
                    log::warn!("frame {}: {}; treating as no detections", index, e);
                    Vec::new()
                }
            }
        };

        let result = evaluate(&detections, &self.context.required_classes);
        if let Some(frame_sink) = self.frame_sink.as_mut() {
            frame_sink.on_analyzed(&analyzed, &detections, &result);
        }

        CurrentResult {
            analyzed_frame: index,
            analyzed_timestamp_secs: timestamp_secs,
            result,
            detections,
            image: analyzed.image,
        }
    }

    fn maybe_emit(
        &self,
        state: &mut StreamState,
        current: &CurrentResult,
        summary: &mut StreamSummary,
    ) {
        if !current.result.has_violations() {
            return;
        }
        match emit(self.sink.as_ref(), state, current, &self.context) {
            Ok(EmitOutcome::Emitted) => summary.alerts_emitted += 1,
            Ok(EmitOutcome::NothingToReport) => {}
            Err(e) => {
                summary.alert_failures += 1;
                log::warn!("alert at frame {}: {}", state.frame_index, e);
            }
        }
    }
}
