//! Offline capture source: replays raw YUV420P frames from a directory,
//! used for deterministic testing of the detection pipeline without a real
//! camera attached.

use std::fs;
use std::path::PathBuf;

use crate::capture::CaptureStatus;
use crate::error::CaptureError;
use crate::frame::FrameBuf;

pub struct FileCapture {
    dir: PathBuf,
    frame_paths: Vec<PathBuf>,
    pos: usize,
    pub loop_playback: bool,
}

impl FileCapture {
    pub fn new(dir: PathBuf, loop_playback: bool) -> Self {
        FileCapture {
            dir,
            frame_paths: Vec::new(),
            pos: 0,
            loop_playback,
        }
    }

    pub fn start(&mut self) -> Result<(u32, u32), CaptureError> {
        let mut entries: Vec<PathBuf> = fs::read_dir(&self.dir)
            .map_err(CaptureError::Io)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "yuv").unwrap_or(false))
            .collect();
        entries.sort();
        self.frame_paths = entries;
        Ok((0, 0))
    }

    pub fn next(&mut self, out: &mut FrameBuf) -> CaptureStatus {
        if self.frame_paths.is_empty() {
            return CaptureStatus::NothingNew;
        }
        if self.pos >= self.frame_paths.len() {
            if self.loop_playback {
                self.pos = 0;
            } else {
                return CaptureStatus::NothingNew;
            }
        }
        let path = &self.frame_paths[self.pos];
        match fs::read(path) {
            Ok(data) if data.len() == out.image_norm.len() => {
                out.image_norm.copy_from_slice(&data);
                self.pos += 1;
                CaptureStatus::Success
            }
            Ok(_) => CaptureStatus::Fatal,
            Err(_) => CaptureStatus::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn replays_frames_in_sorted_order_and_stops_at_end() {
        let dir = tempfile::tempdir().unwrap();
        for (i, byte) in [1u8, 2u8, 3u8].iter().enumerate() {
            let path = dir.path().join(format!("{i:03}.yuv"));
            let mut f = fs::File::create(path).unwrap();
            f.write_all(&[*byte; 4]).unwrap();
        }
        let mut cap = FileCapture::new(dir.path().to_path_buf(), false);
        cap.start().unwrap();

        let mut frame = FrameBuf::new(4, None);
        assert_eq!(cap.next(&mut frame), CaptureStatus::Success);
        assert_eq!(frame.image_norm[0], 1);
        cap.next(&mut frame);
        assert_eq!(frame.image_norm[0], 2);
        cap.next(&mut frame);
        assert_eq!(frame.image_norm[0], 3);
        assert_eq!(cap.next(&mut frame), CaptureStatus::NothingNew);
    }
}
