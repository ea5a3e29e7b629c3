//! Noise/threshold auto-tune and light-switch suppression.
//!
//! Grounded on `original_source/alg.cpp`'s `alg_noise_tune`,
//! `alg_threshold_tune` and `alg_lightswitch`.

pub const THRESHOLD_TUNE_LENGTH: usize = 5;

/// Computes an updated noise level from the current frame, only valid to
/// call when not already in motion and `diffs <= threshold`.
pub fn noise_tune(reference: &[u8], new_luma: &[u8], smartmask_final: &[u8], current_noise: i64) -> i64 {
    let mut sum: i64 = 0;
    let mut count: i64 = 0;
    for i in 0..reference.len() {
        if smartmask_final[i] == 0 {
            continue;
        }
        sum += (reference[i] as i64 - new_luma[i] as i64).abs() + 1;
        count += 1;
    }
    if count <= 3 {
        return current_noise;
    }
    let mean = sum / (count / 3);
    4 + (current_noise + mean) / 2
}

pub struct ThresholdTuner {
    window: [i64; THRESHOLD_TUNE_LENGTH],
    pos: usize,
}

impl ThresholdTuner {
    pub fn new() -> Self {
        ThresholdTuner {
            window: [0; THRESHOLD_TUNE_LENGTH],
            pos: 0,
        }
    }

    /// Feeds one frame's diff count into the sliding window and returns
    /// the updated threshold. While motion is being detected, the current
    /// slot is overwritten with `threshold / 4` rather than the raw diff
    /// count, damping the window against the motion itself.
    pub fn update(&mut self, diffs: i64, motion_detected: bool, threshold: i64) -> i64 {
        self.window[self.pos] = if motion_detected { threshold / 4 } else { diffs };
        self.pos = (self.pos + 1) % THRESHOLD_TUNE_LENGTH;

        let sum: i64 = self.window.iter().sum();
        let max = *self.window.iter().max().unwrap_or(&0);
        let candidate = (sum / (THRESHOLD_TUNE_LENGTH as i64 / 4).max(1)).max(2 * max);

        if candidate < threshold {
            (threshold + candidate) / 2
        } else {
            threshold
        }
    }
}

impl Default for ThresholdTuner {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns `true` if `diffs` indicates a global illumination change rather
/// than real motion, per `lightswitch_percent` of the frame's pixels.
pub fn is_lightswitch(diffs: i64, motionsize: usize, lightswitch_percent: u32) -> bool {
    lightswitch_percent > 0 && diffs > (motionsize as i64) * (lightswitch_percent as i64) / 100
}

/// Micro-light-switch: near-identical diff counts and a centre that barely
/// moved, within a short window, also indicate an illumination event
/// rather than genuine motion.
pub fn is_micro_lightswitch(
    diffs: i64,
    previous_diffs: i64,
    dx: i32,
    dy: i32,
    width: i32,
    height: i32,
    elapsed_secs: f64,
) -> bool {
    if elapsed_secs > 2.0 {
        return false;
    }
    let diff_ratio_close = previous_diffs > 0
        && (diffs - previous_diffs).abs() as f64 <= previous_diffs as f64 / 15.0;
    diff_ratio_close && dx.abs() < width / 150 && dy.abs() < height / 150
}

/// Decays the smart-mask sensitivity buffer, folds in the per-pixel
/// accumulator the diff engine has been filling, and re-derives the binary
/// `smartmask_final` gate -- then runs the same erode passes the despeckle
/// recipe uses, since `smartmask_final`'s 0/255 polarity is inverted
/// relative to a normal motion mask (eroding the 255 region here shrinks the
/// *passing* area, growing the exclusion zone around noisy pixels).
///
/// Grounded on `original_source/alg.cpp`'s `alg_tune_smartmask`.
pub fn tune_smartmask(
    smartmask: &mut [u8],
    smartmask_final: &mut [u8],
    smartmask_buffer: &mut [i32],
    width: usize,
    height: usize,
    lastrate: u32,
    smart_mask_speed: u32,
) {
    let sensitivity = (lastrate as i64 * (11 - smart_mask_speed as i64)).max(1);

    for i in 0..smartmask.len() {
        if smartmask[i] > 0 {
            smartmask[i] -= 1;
        }

        let diff = (smartmask_buffer[i] as i64 / sensitivity) as i32;
        if diff != 0 {
            let current = smartmask[i] as i32;
            smartmask[i] = if current <= diff + 80 {
                (current + diff).clamp(0, 255) as u8
            } else {
                80
            };
            smartmask_buffer[i] %= sensitivity as i32;
        }

        smartmask_final[i] = if smartmask[i] > 20 { 0 } else { 255 };
    }

    crate::detect::despeckle::erode(smartmask_final, width, height, false); // erode9
    crate::detect::despeckle::erode(smartmask_final, width, height, true); // erode5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_tune_falls_back_when_insufficient_samples() {
        let reference = vec![10u8; 2];
        let new_luma = vec![12u8; 2];
        let mask = vec![0u8; 2]; // all masked out, count stays 0
        let noise = noise_tune(&reference, &new_luma, &mask, 32);
        assert_eq!(noise, 32);
    }

    #[test]
    fn noise_tune_moves_toward_measured_mean() {
        let reference = vec![10u8; 100];
        let new_luma = vec![12u8; 100];
        let mask = vec![255u8; 100];
        let noise = noise_tune(&reference, &new_luma, &mask, 0);
        assert!(noise > 0);
    }

    #[test]
    fn lightswitch_fires_above_percent_threshold() {
        assert!(is_lightswitch(6000, 10_000, 50));
        assert!(!is_lightswitch(4000, 10_000, 50));
    }

    #[test]
    fn threshold_tuner_pulls_threshold_toward_recent_window() {
        let mut tuner = ThresholdTuner::new();
        let mut threshold = 1500;
        for _ in 0..THRESHOLD_TUNE_LENGTH {
            threshold = tuner.update(10, false, threshold);
        }
        assert!(threshold <= 1500);
    }

    #[test]
    fn tune_smartmask_blocks_pixels_once_decayed_sensitivity_exceeds_20() {
        let mut smartmask = vec![0u8; 16];
        let mut smartmask_final = vec![255u8; 16];
        let mut smartmask_buffer = vec![2000i32; 16]; // large accumulated hits everywhere

        tune_smartmask(&mut smartmask, &mut smartmask_final, &mut smartmask_buffer, 4, 4, 10, 1);

        assert!(smartmask.iter().all(|&v| v > 20));
        // erode passes can only shrink the "passing" (255) region further,
        // never resurrect a blocked pixel.
        assert!(smartmask_final.iter().all(|&v| v == 0));
    }

    #[test]
    fn tune_smartmask_leaves_quiet_pixels_passing() {
        let mut smartmask = vec![0u8; 16];
        let mut smartmask_final = vec![255u8; 16];
        let mut smartmask_buffer = vec![0i32; 16];

        tune_smartmask(&mut smartmask, &mut smartmask_final, &mut smartmask_buffer, 4, 4, 10, 1);

        assert!(smartmask.iter().all(|&v| v == 0));
        assert!(smartmask_final.iter().all(|&v| v == 255));
    }

    #[test]
    fn micro_lightswitch_requires_close_diffs_and_small_centre_shift() {
        assert!(is_micro_lightswitch(1000, 1000, 0, 0, 640, 480, 0.5));
        assert!(!is_micro_lightswitch(1000, 100, 0, 0, 640, 480, 0.5), "diffs too far apart");
        assert!(!is_micro_lightswitch(1000, 1000, 50, 0, 640, 480, 0.5), "centre moved too far");
        assert!(!is_micro_lightswitch(1000, 1000, 0, 0, 640, 480, 3.0), "outside the window");
    }
}
