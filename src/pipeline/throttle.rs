//! Throttle gate: minimum frame gap between persisted alerts.
//!
//! Evaluated on every frame read, independent of the sampling stride.

/// Frames per throttle window: `max(1, round(log_period_secs * native_fps))`.
pub fn log_interval_frames(log_period_secs: f64, native_fps: f64) -> u64 {
    let frames = (log_period_secs * native_fps).round();
    if frames.is_finite() && frames >= 1.0 {
        frames as u64
    } else {
        1
    }
}

/// True iff `frame_index - last_logged_frame >= log_interval_frames`.
pub fn should_emit(frame_index: u64, last_logged_frame: i64, log_interval_frames: u64) -> bool {
    let elapsed = frame_index as i128 - last_logged_frame as i128;
    elapsed >= log_interval_frames as i128
}
