//! Frame sampling: which frames are submitted to detection.

/// Frame stride between analyses: `max(1, round(native_fps / target_fps))`.
pub fn sample_interval_frames(native_fps: f64, target_fps: f64) -> u64 {
    if !(native_fps > 0.0) || !(target_fps > 0.0) {
        return 1;
    }
    let interval = (native_fps / target_fps).round();
    if interval.is_finite() && interval >= 1.0 {
        interval as u64
    } else {
        1
    }
}

/// True iff the frame at `frame_index` should be analyzed.
pub fn should_analyze(frame_index: u64, sample_interval_frames: u64) -> bool {
    frame_index % sample_interval_frames.max(1) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thirty_fps_at_three_analyzes_every_tenth_frame() {
        let interval = sample_interval_frames(30.0, 3.0);
        assert_eq!(interval, 10);

        let analyzed: Vec<u64> = (0..31).filter(|i| should_analyze(*i, interval)).collect();
        assert_eq!(analyzed, vec![0, 10, 20, 30]);
        assert!((1..10).all(|i| !should_analyze(i, interval)));
    }

    #[test]
    fn interval_rounds_to_nearest() {
        assert_eq!(sample_interval_frames(25.0, 3.0), 8);
        assert_eq!(sample_interval_frames(29.97, 3.0), 10);
        assert_eq!(sample_interval_frames(15.0, 4.0), 4);
    }

    #[test]
    fn interval_never_drops_below_one() {
        assert_eq!(sample_interval_frames(2.0, 3.0), 1);
        assert_eq!(sample_interval_frames(30.0, 0.0), 1);
        assert_eq!(sample_interval_frames(0.0, 3.0), 1);
        assert!(should_analyze(7, 0));
    }

    #[test]
    fn sampler_selects_exact_multiples() {
        for native in [10.0, 24.0, 30.0, 60.0] {
            for target in [1.0, 2.0, 3.0, 5.0] {
                let interval = sample_interval_frames(native, target);
                assert!(interval >= 1);
                for idx in 0..200u64 {
                    assert_eq!(should_analyze(idx, interval), idx % interval == 0);
                }
            }
        }
    }
}
