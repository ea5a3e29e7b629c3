//! Per-frame image buffer and the bookkeeping the detection pipeline hangs off it.

use std::time::SystemTime;

use bitflags::bitflags;

bitflags! {
    /// Per-frame state flags, OR'd together as the frame moves through the
    /// ring and the event FSM.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FrameFlags: u16 {
        const TRIGGER = 1 << 0;
        const MOTION  = 1 << 1;
        const SAVE    = 1 << 2;
        const SAVED   = 1 << 3;
        const PRECAP  = 1 << 4;
        const POSTCAP = 1 << 5;
    }
}

/// Centre, bounding box and spread statistics for one frame's detected motion.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Location {
    pub x: i32,
    pub y: i32,
    pub minx: i32,
    pub miny: i32,
    pub maxx: i32,
    pub maxy: i32,
    pub width: i32,
    pub height: i32,
    pub stddev_x: f64,
    pub stddev_y: f64,
    pub stddev_xy: f64,
}

/// One captured (or synthesised placeholder) image plus everything the
/// detection pipeline computed about it.
///
/// `image_norm` is always present; `image_high` mirrors it at the
/// configured high-resolution size when a camera is set up for dual-stream
/// capture.
pub struct FrameBuf {
    pub imgts: SystemTime,
    pub monots: u64,
    pub shot: u32,

    pub image_norm: Vec<u8>,
    pub image_high: Option<Vec<u8>>,

    pub diffs: i64,
    pub diffs_raw: i64,
    pub diffs_ratio: f64,

    pub location: Location,
    pub cent_dist: i64,
    pub total_labels: u32,

    pub flags: FrameFlags,
}

impl FrameBuf {
    /// Allocates a zeroed YUV420P buffer of `size_norm` bytes (and, if
    /// `size_high` is given, a second buffer for the high-res stream).
    pub fn new(size_norm: usize, size_high: Option<usize>) -> Self {
        FrameBuf {
            imgts: SystemTime::UNIX_EPOCH,
            monots: 0,
            shot: 0,
            image_norm: vec![0u8; size_norm],
            image_high: size_high.map(|s| vec![0u8; s]),
            diffs: 0,
            diffs_raw: 0,
            diffs_ratio: 0.0,
            location: Location::default(),
            cent_dist: 0,
            total_labels: 0,
            flags: FrameFlags::empty(),
        }
    }

    /// Resets the per-frame detection results while keeping the allocated
    /// image buffers, as `reset_images()` does at the top of each camera
    /// thread iteration.
    pub fn reset_for_reuse(&mut self) {
        self.diffs = 0;
        self.diffs_raw = 0;
        self.diffs_ratio = 0.0;
        self.location = Location::default();
        self.cent_dist = 0;
        self.total_labels = 0;
        self.flags = FrameFlags::empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_or_and_contains() {
        let mut f = FrameFlags::empty();
        f |= FrameFlags::TRIGGER;
        f |= FrameFlags::SAVE;
        assert!(f.contains(FrameFlags::TRIGGER));
        assert!(f.contains(FrameFlags::SAVE));
        assert!(!f.contains(FrameFlags::MOTION));
    }

    #[test]
    fn reset_for_reuse_clears_detection_state_not_image() {
        let mut frame = FrameBuf::new(16, None);
        frame.image_norm[0] = 42;
        frame.diffs = 10;
        frame.flags.insert(FrameFlags::SAVE);
        frame.reset_for_reuse();
        assert_eq!(frame.diffs, 0);
        assert_eq!(frame.flags, FrameFlags::empty());
        assert_eq!(frame.image_norm[0], 42);
    }
}
