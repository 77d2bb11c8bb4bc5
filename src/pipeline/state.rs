//! Per-stream counters and the carried-forward analysis result.

use image::RgbImage;

use crate::detect::RawDetection;
use crate::pipeline::model::FrameResult;
use crate::pipeline::sampler::{sample_interval_frames, should_analyze};
use crate::pipeline::throttle::{log_interval_frames, should_emit};

/// Per-stream counters and intervals. Owned by the stream driver.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamState {
    pub frame_index: u64,
    pub native_fps: f64,
    pub sample_interval_frames: u64,
    pub log_interval_frames: u64,
    /// Frame index of the last emitted alert. Starts one window before frame 0.
    pub last_logged_frame: i64,
}

impl StreamState {
    pub fn new(native_fps: f64, target_fps: f64, log_period_secs: f64) -> Self {
        let sample_interval_frames = sample_interval_frames(native_fps, target_fps);
        let log_interval_frames = log_interval_frames(log_period_secs, native_fps);
        Self {
            frame_index: 0,
            native_fps,
            sample_interval_frames,
            log_interval_frames,
            last_logged_frame: -(log_interval_frames as i64),
        }
    }

    pub fn should_analyze(&self) -> bool {
        should_analyze(self.frame_index, self.sample_interval_frames)
    }

    pub fn gate_open(&self) -> bool {
        should_emit(
            self.frame_index,
            self.last_logged_frame,
            self.log_interval_frames,
        )
    }

    /// Record an alert attempt at the current frame. Never moves backwards.
    pub fn record_emission(&mut self) {
        let current = self.frame_index as i64;
        if current > self.last_logged_frame {
            self.last_logged_frame = current;
        }
    }

    pub fn advance(&mut self) {
        self.frame_index += 1;
    }

    pub fn timestamp_secs(&self) -> f64 {
        crate::frame::stream_timestamp(self.frame_index, self.native_fps)
    }
}

/// Result of the most recent analysis pass, carried forward to later frames.
///
/// Every analyzed frame replaces it, so it is at most
/// `sample_interval_frames - 1` frames old when the throttle gate consults it.
#[derive(Clone, Debug)]
pub struct CurrentResult {
    pub analyzed_frame: u64,
    pub analyzed_timestamp_secs: f64,
    pub result: FrameResult,
    pub detections: Vec<RawDetection>,
    /// The resized frame the detections refer to.
    pub image: RgbImage,
}

impl CurrentResult {
    pub fn staleness_frames(&self, frame_index: u64) -> u64 {
        frame_index.saturating_sub(self.analyzed_frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_allows_immediate_emission() {
        let state = StreamState::new(30.0, 3.0, 5.0);
        assert_eq!(state.sample_interval_frames, 10);
        assert_eq!(state.log_interval_frames, 150);
        assert_eq!(state.last_logged_frame, -150);
        assert!(state.gate_open());
        assert!(state.should_analyze());
    }

    #[test]
    fn emission_closes_gate_for_one_window() {
        let mut state = StreamState::new(30.0, 3.0, 5.0);
        state.record_emission();
        assert_eq!(state.last_logged_frame, 0);

        for _ in 1..150 {
            state.advance();
            assert!(!state.gate_open(), "frame {}", state.frame_index);
        }
        state.advance();
        assert_eq!(state.frame_index, 150);
        assert!(state.gate_open());
    }

    #[test]
    fn last_logged_frame_only_moves_forward() {
        let mut state = StreamState::new(10.0, 2.0, 1.0);
        state.frame_index = 40;
        state.record_emission();
        state.frame_index = 20;
        state.record_emission();
        assert_eq!(state.last_logged_frame, 40);
    }
}
