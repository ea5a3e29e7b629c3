//! Thin adapter traits at the boundary this crate keeps external: encoding,
//! still-picture writing, database persistence, loopback and PTZ output,
//! and user-script invocation. The core calls these by interface only;
//! concrete implementations live outside this crate.

use std::path::Path;
use std::process::Command;

use crate::camera::event::EventInfo;
use crate::frame::FrameBuf;

/// A YUV420P movie writer, one instance per event per output kind (norm /
/// motion / extpipe), matching `original_source/movie.cpp`'s interface.
pub trait MovieWriter: Send {
    fn put_image(&mut self, frame: &FrameBuf) -> anyhow::Result<()>;
    fn close(&mut self) -> anyhow::Result<()>;
}

/// Still-image writer (JPEG/WebP/PPM); `original_source/picture.cpp`.
pub trait PictureWriter: Send {
    fn write(&mut self, frame: &FrameBuf, path: &Path) -> anyhow::Result<()>;
}

/// Event/file persistence; `original_source/dbse.hpp`.
pub trait Database: Send {
    fn exec(&mut self, event: &EventInfo) -> anyhow::Result<()>;
    fn filelist_add(&mut self, event_nbr: i64, path: &Path, kind: &str) -> anyhow::Result<()>;
}

/// Video-loopback device writer; `original_source/video_loopback.cpp`.
pub trait LoopbackWriter: Send {
    fn write_frame(&mut self, frame: &FrameBuf) -> anyhow::Result<()>;
}

/// Overlay renderer: mask/diff-count debug drawing and `strftime`-style
/// left/right text templates; `original_source/draw.cpp`.
pub trait Overlay: Send {
    fn draw(&mut self, frame: &mut FrameBuf) -> anyhow::Result<()>;
}

/// Publishes the current JPEG for the HTTP control/streaming server to
/// serve, and exposes the action flags the server lets a user toggle.
pub struct WebInterfaceSlot {
    pub latest_jpeg: std::sync::Mutex<Option<Vec<u8>>>,
    pub user_event_requested: std::sync::atomic::AtomicBool,
    pub pause_requested: std::sync::atomic::AtomicBool,
    pub snapshot_requested: std::sync::atomic::AtomicBool,
}

impl WebInterfaceSlot {
    pub fn new() -> Self {
        WebInterfaceSlot {
            latest_jpeg: std::sync::Mutex::new(None),
            user_event_requested: std::sync::atomic::AtomicBool::new(false),
            pause_requested: std::sync::atomic::AtomicBool::new(false),
            snapshot_requested: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn publish(&self, jpeg: Vec<u8>) {
        *self.latest_jpeg.lock().unwrap() = Some(jpeg);
    }
}

impl Default for WebInterfaceSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a configured user script (`on_event_start` etc) with the event's
/// file path as `argv[1]`, matching the legacy shell-out contract.
pub fn run_user_script(script: &str, arg: &Path) -> anyhow::Result<()> {
    if script.is_empty() {
        return Ok(());
    }
    let status = Command::new("sh")
        .arg("-c")
        .arg(format!("{script} {}", arg.display()))
        .status()?;
    if !status.success() {
        log::warn!("user script {script:?} exited with status {status:?}");
    }
    Ok(())
}
