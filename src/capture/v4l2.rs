//! V4L2 local capture variant, Linux-only.
//!
//! Grounded on the `v4l` crate usage in
//! `cosmic-utils-camera/src/backends/camera/v4l2_depth.rs`, which runs
//! `Device` and `MmapStream` together inside one dedicated capture thread's
//! stack frame rather than storing them as separate struct fields -- since
//! `MmapStream<'a>` borrows `&'a Device` for as long as it's read, keeping
//! both on the thread's own stack avoids ever needing to extend that
//! borrow's lifetime. `camera_hub` has no local-capture path at all, only
//! RTSP ingestion, so this variant is adapted from elsewhere in the pack.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

use crate::capture::CaptureStatus;
use crate::error::CaptureError;
use crate::frame::FrameBuf;

struct LatestFrame {
    data: Vec<u8>,
    fresh: bool,
}

pub struct V4l2Capture {
    device_path: String,
    width: u32,
    height: u32,
    latest: Arc<Mutex<Option<LatestFrame>>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl V4l2Capture {
    pub fn new(device_path: String, width: u32, height: u32) -> Self {
        V4l2Capture {
            device_path,
            width,
            height,
            latest: Arc::new(Mutex::new(None)),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn start(&mut self) -> Result<(u32, u32), CaptureError> {
        let dev =
            Device::with_path(&self.device_path).map_err(|e| CaptureError::Open(e.to_string()))?;

        let mut fmt = dev.format().map_err(|e| CaptureError::Open(e.to_string()))?;
        fmt.width = self.width;
        fmt.height = self.height;
        fmt.fourcc = FourCC::new(b"YU12");
        let fmt = dev
            .set_format(&fmt)
            .map_err(|e| CaptureError::Open(e.to_string()))?;

        if fmt.width != self.width || fmt.height != self.height {
            return Err(CaptureError::Open(format!(
                "device negotiated {}x{} instead of requested {}x{}",
                fmt.width, fmt.height, self.width, self.height
            )));
        }
        self.width = fmt.width;
        self.height = fmt.height;

        let latest = self.latest.clone();
        let stop = self.stop.clone();
        let device_path = self.device_path.clone();
        self.worker = Some(
            std::thread::Builder::new()
                .name(format!("v4l2-{device_path}"))
                .spawn(move || capture_loop(dev, latest, stop))
                .map_err(|e| CaptureError::Open(e.to_string()))?,
        );

        Ok((self.width, self.height))
    }

    pub fn next(&mut self, out: &mut FrameBuf) -> CaptureStatus {
        let mut slot = self.latest.lock().unwrap();
        match slot.as_mut() {
            Some(frame) if frame.fresh => {
                if frame.data.len() != out.image_norm.len() {
                    return CaptureStatus::Fatal;
                }
                out.image_norm.copy_from_slice(&frame.data);
                frame.fresh = false;
                CaptureStatus::Success
            }
            Some(_) | None => CaptureStatus::NothingNew,
        }
    }
}

/// Owns `dev` and `stream` together on its own stack frame for the whole
/// capture lifetime, so `stream`'s borrow of `dev` never needs to outlive
/// this function and no lifetime-extending unsafe is required.
fn capture_loop(dev: Device, latest: Arc<Mutex<Option<LatestFrame>>>, stop: Arc<AtomicBool>) {
    let mut stream = match MmapStream::with_buffers(&dev, Type::VideoCapture, 4) {
        Ok(s) => s,
        Err(e) => {
            log::error!("v4l2 stream setup failed: {e}");
            return;
        }
    };

    while !stop.load(Ordering::SeqCst) {
        match stream.next() {
            Ok((data, _meta)) => {
                let mut slot = latest.lock().unwrap();
                *slot = Some(LatestFrame {
                    data: data.to_vec(),
                    fresh: true,
                });
            }
            Err(e) => {
                log::warn!("v4l2 capture error: {e}");
                break;
            }
        }
    }
}

impl Drop for V4l2Capture {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}
