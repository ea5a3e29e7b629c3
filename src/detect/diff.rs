//! Difference engine: produces the raw motion mask and diff statistics
//! under four masking policies (none, fixed mask, smart mask, fixed+smart).
//!
//! Grounded on `original_source/alg.cpp`'s `alg_diff*` family for the
//! pixel-level algorithm; the Rust shape (a single parametrised pass rather
//! than four near-duplicated C functions) follows the zone-based diff in
//! `other_examples/.../plugins-motion-motion.rs.rs`, which likewise folds
//! several masking cases into one parametrised analysis routine.

pub struct DiffResult {
    pub diffs: i64,
    pub diffs_net: i64,
    pub diffs_ratio: f64,
}

impl DiffResult {
    fn finish(self) -> DiffResult {
        DiffResult {
            diffs_ratio: if self.diffs > 0 {
                (self.diffs_net.unsigned_abs() as f64) * 100.0 / self.diffs as f64
            } else {
                0.0
            },
            ..self
        }
    }
}

/// Runs one full differencing pass. `fixed_mask` and `smart_mask_final`
/// are `None` when that policy axis is disabled, which folds all four
/// policies (no-mask / fixed / smart / fixed+smart) into this one routine.
#[allow(clippy::too_many_arguments)]
pub fn diff(
    reference: &[u8],
    new_luma: &[u8],
    out_motion: &mut [u8],
    fixed_mask: Option<&[u8]>,
    smart_mask_final: Option<&[u8]>,
    smartmask_buffer: Option<&mut [i32]>,
    event_changed: bool,
    noise: i64,
    threshold_ratio_change: i64,
) -> DiffResult {
    let n = reference.len();
    debug_assert_eq!(new_luma.len(), n);
    debug_assert_eq!(out_motion.len(), n);

    let mut diffs = 0i64;
    let mut diffs_net = 0i64;
    let mut smartmask_buffer = smartmask_buffer;

    for i in 0..n {
        let mut d = reference[i] as i64 - new_luma[i] as i64;

        if let Some(mask) = fixed_mask {
            d = d * mask[i] as i64 / 255;
        }

        if let Some(final_mask) = smart_mask_final {
            if d.abs() > noise {
                if event_changed {
                    if let Some(buf) = smartmask_buffer.as_deref_mut() {
                        buf[i] += 5;
                    }
                }
                if final_mask[i] == 0 {
                    d = 0;
                }
            }
        }

        if d.abs() > noise {
            out_motion[i] = new_luma[i];
            diffs += 1;
            if d > threshold_ratio_change {
                diffs_net += 1;
            } else if d < -threshold_ratio_change {
                diffs_net -= 1;
            }
        } else {
            out_motion[i] = 0;
        }
    }

    DiffResult {
        diffs,
        diffs_net,
        diffs_ratio: 0.0,
    }
    .finish()
}

/// Cheap early-exit pre-check used while not already in an active event:
/// samples every `step` pixels (rounded up to an odd stride) and bails as
/// soon as the extrapolated diff count would clear `threshold`.
pub fn fast_precheck(
    reference: &[u8],
    new_luma: &[u8],
    noise: i64,
    threshold: i64,
    motionsize: usize,
) -> bool {
    let mut step = (motionsize / 10_000).max(1);
    if step % 2 == 0 {
        step += 1;
    }
    let mut diffs = 0i64;
    let bail_at = threshold / 2 / step as i64;
    let mut i = 0;
    while i < reference.len() {
        if (reference[i] as i64 - new_luma[i] as i64).abs() > noise {
            diffs += 1;
            if diffs > bail_at.max(1) {
                return true;
            }
        }
        i += step;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_mask_counts_all_pixels_above_noise() {
        let reference = vec![0u8; 4];
        let new_luma = vec![100u8; 4];
        let mut out = vec![0u8; 4];
        let result = diff(&reference, &new_luma, &mut out, None, None, None, false, 10, 3);
        assert_eq!(result.diffs, 4);
        assert_eq!(out, new_luma);
    }

    #[test]
    fn fixed_mask_suppresses_masked_pixels() {
        let reference = vec![0u8; 2];
        let new_luma = vec![100u8; 2];
        let mask = vec![255u8, 0u8];
        let mut out = vec![0u8; 2];
        let result = diff(&reference, &new_luma, &mut out, Some(&mask), None, None, false, 10, 3);
        assert_eq!(result.diffs, 1);
        assert_eq!(out[1], 0);
    }

    #[test]
    fn smart_mask_increments_buffer_per_pixel_per_call_not_once_per_event() {
        // smartmask_buffer increments per qualifying pixel on every call
        // where event_changed is true, not once per event.
        let reference = vec![0u8; 4];
        let new_luma = vec![100u8; 4];
        let final_mask = vec![255u8; 4];
        let mut out = vec![0u8; 4];
        let mut buf = vec![0i32; 4];
        diff(
            &reference,
            &new_luma,
            &mut out,
            None,
            Some(&final_mask),
            Some(&mut buf),
            true,
            10,
            3,
        );
        assert!(buf.iter().all(|&v| v == 5));
    }

    #[test]
    fn diffs_ratio_is_bounded_0_to_100() {
        let reference = vec![0u8, 0, 0, 0];
        let new_luma = vec![50u8, 200, 50, 200];
        let mut out = vec![0u8; 4];
        let result = diff(&reference, &new_luma, &mut out, None, None, None, false, 10, 3);
        assert!(result.diffs_ratio >= 0.0 && result.diffs_ratio <= 100.0);
        assert!(result.diffs >= result.diffs_net.unsigned_abs() as i64);
    }
}
