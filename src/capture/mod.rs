//! Capture sources are expressed as one tagged-variant enum with a single
//! capability surface rather than as trait objects over an inheritance
//! hierarchy.

pub mod file;
pub mod libcam;
#[cfg(target_os = "linux")]
pub mod v4l2;

use std::sync::Arc;

use crate::error::CaptureError;
use crate::frame::FrameBuf;
use crate::netcam::handler::NetcamHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Success,
    NothingNew,
    Fatal,
}

pub enum CaptureSource {
    #[cfg(target_os = "linux")]
    V4l2(v4l2::V4l2Capture),
    Libcam(libcam::LibcamCapture),
    Netcam(Arc<NetcamHandle>, i64),
    File(file::FileCapture),
}

impl CaptureSource {
    pub fn start(&mut self) -> Result<(u32, u32), CaptureError> {
        match self {
            #[cfg(target_os = "linux")]
            CaptureSource::V4l2(c) => c.start(),
            CaptureSource::Libcam(c) => c.start(),
            CaptureSource::Netcam(_, _) => Ok((0, 0)),
            CaptureSource::File(c) => c.start(),
        }
    }

    pub fn next(&mut self, out: &mut FrameBuf) -> CaptureStatus {
        match self {
            #[cfg(target_os = "linux")]
            CaptureSource::V4l2(c) => c.next(out),
            CaptureSource::Libcam(c) => c.next(out),
            CaptureSource::Netcam(handle, last_seen) => {
                match handle.take_latest(*last_seen) {
                    Some((idnbr, frame)) => {
                        *last_seen = idnbr;
                        if frame.data.len() == out.image_norm.len() {
                            out.image_norm.copy_from_slice(&frame.data);
                            out.imgts = frame.timestamp;
                            CaptureStatus::Success
                        } else {
                            CaptureStatus::NothingNew
                        }
                    }
                    // No new frame published yet, whether still connecting,
                    // reconnecting, or simply between frames while
                    // connected -- `do_capture`'s `missing_frame_counter`/
                    // `device_tmo` escalation already tracks staleness
                    // independently of the handler's own status.
                    None => CaptureStatus::NothingNew,
                }
            }
            CaptureSource::File(c) => c.next(out),
        }
    }

    /// Fills a grey placeholder frame for a camera that has lost its
    /// source; the actual "lost signal" text overlay is drawn by the
    /// external [`Overlay`](crate::external::Overlay) implementation.
    pub fn noimage(&self, out: &mut FrameBuf) {
        out.image_norm.fill(0x80);
        let luma_len = out.image_norm.len() * 2 / 3;
        out.image_norm[..luma_len].fill(0x40);
    }
}
