//! Libcamera capture variant: spawns `rpicam-vid`/`libcamera-vid` as a
//! subprocess and reads raw YUV420 frames off its stdout pipe.
//!
//! Grounded on `camera_hub::raspberry_pi::rpi_dual_stream::start`, which
//! spawns the same tool via `Command::new("sh").arg("-c")` and accumulates
//! its stdout into a `BytesMut` through a fixed-size read loop.

use std::io::Read;
use std::process::{Child, Command, Stdio};

use bytes::{Buf, BytesMut};

use crate::capture::CaptureStatus;
use crate::error::CaptureError;
use crate::frame::FrameBuf;

const READ_CHUNK: usize = 8192;

pub struct LibcamCapture {
    device: String,
    width: u32,
    height: u32,
    framerate: u32,
    child: Option<Child>,
    accum: BytesMut,
    frame_size: usize,
}

impl LibcamCapture {
    pub fn new(device: String, width: u32, height: u32, framerate: u32) -> Self {
        // rpicam-vid writes rows padded to a 64-byte stride, matching
        // camera_hub::raspberry_pi::rpi_dual_stream's yuv_width calculation.
        let stride_width = width.div_ceil(64) * 64;
        let frame_size = (stride_width * height * 3 / 2) as usize;
        LibcamCapture {
            device,
            width,
            height,
            framerate,
            child: None,
            accum: BytesMut::with_capacity(1024 * 1024),
            frame_size,
        }
    }

    pub fn start(&mut self) -> Result<(u32, u32), CaptureError> {
        let cmd = format!(
            "rpicam-vid --camera {} -t 0 -n --width {} --height {} --framerate {} --codec yuv420 -o -",
            self.device, self.width, self.height, self.framerate
        );
        let child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(CaptureError::Io)?;
        self.child = Some(child);
        Ok((self.width, self.height))
    }

    pub fn next(&mut self, out: &mut FrameBuf) -> CaptureStatus {
        let Some(child) = self.child.as_mut() else {
            return CaptureStatus::Fatal;
        };
        let Some(stdout) = child.stdout.as_mut() else {
            return CaptureStatus::Fatal;
        };

        let mut temp_buf = [0u8; READ_CHUNK];
        while self.accum.len() < self.frame_size {
            match stdout.read(&mut temp_buf) {
                Ok(0) => return CaptureStatus::Fatal,
                Ok(n) => self.accum.extend_from_slice(&temp_buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    return CaptureStatus::NothingNew
                }
                Err(_) => return CaptureStatus::Fatal,
            }
        }

        if out.image_norm.len() != self.frame_size {
            return CaptureStatus::Fatal;
        }
        out.image_norm.copy_from_slice(&self.accum[..self.frame_size]);
        self.accum.advance(self.frame_size);
        CaptureStatus::Success
    }
}

impl Drop for LibcamCapture {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
        }
    }
}
