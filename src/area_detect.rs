//! 3x3 area-detect grid: partitions the frame into nine cells and fires
//! `on_area_detected` at most once per event, for whichever configured
//! cells the motion centre lands in.
//!
//! Grounded on `original_source/alg.cpp`'s `alg_area_detect`; digit
//! decoding is validated eagerly at config load instead of the legacy
//! `area_detect[i] - 49` subtraction, which silently wrapped on a
//! non-digit character rather than rejecting it.

use std::collections::HashSet;

/// Which of the nine grid cells (numbered 1..9, left-to-right top-to-bottom)
/// contains `(x, y)`.
pub fn cell_for_point(x: i32, y: i32, width: i32, height: i32) -> u8 {
    let col = (x * 3 / width.max(1)).clamp(0, 2);
    let row = (y * 3 / height.max(1)).clamp(0, 2);
    (row * 3 + col + 1) as u8
}

/// Tracks which configured cells have already fired within the current
/// event, so `on_area_detected` runs at most once per event per cell.
pub struct AreaDetector {
    configured: HashSet<u8>,
    fired_this_event: HashSet<u8>,
}

impl AreaDetector {
    /// `digits` must already be validated (each char in '1'..='9').
    pub fn new(digits: &str) -> Self {
        let configured = digits.chars().map(|c| c as u8 - b'0').collect();
        AreaDetector {
            configured,
            fired_this_event: HashSet::new(),
        }
    }

    pub fn reset_for_new_event(&mut self) {
        self.fired_this_event.clear();
    }

    /// Returns `true` if the motion at `(x, y)` should fire
    /// `on_area_detected` now (configured, and not already fired this
    /// event).
    pub fn check(&mut self, x: i32, y: i32, width: i32, height: i32) -> bool {
        let cell = cell_for_point(x, y, width, height);
        if self.configured.contains(&cell) && !self.fired_this_event.contains(&cell) {
            self.fired_this_event.insert(cell);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_numbering_matches_row_major_order() {
        assert_eq!(cell_for_point(0, 0, 300, 300), 1);
        assert_eq!(cell_for_point(150, 0, 300, 300), 2);
        assert_eq!(cell_for_point(299, 0, 300, 300), 3);
        assert_eq!(cell_for_point(0, 299, 300, 300), 7);
        assert_eq!(cell_for_point(299, 299, 300, 300), 9);
    }

    #[test]
    fn fires_at_most_once_per_event() {
        let mut det = AreaDetector::new("159");
        assert!(det.check(0, 0, 300, 300));
        assert!(!det.check(0, 0, 300, 300));
        det.reset_for_new_event();
        assert!(det.check(0, 0, 300, 300));
    }

    #[test]
    fn unconfigured_cell_never_fires() {
        let mut det = AreaDetector::new("1");
        assert!(!det.check(299, 299, 300, 300));
    }
}
