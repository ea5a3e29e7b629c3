//! Domain error types for the library seams that need to distinguish
//! failure modes programmatically. Application-level call sites (camera
//! thread top level, supervisor, `main`) work in terms of `anyhow::Result`
//! and wrap these with `?` / `.context(...)`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid area_detect digit {0:?}, expected 1-9")]
    InvalidAreaDetectDigit(char),

    #[error("invalid despeckle_filter character {0:?}, expected one of E,e,D,d,l")]
    InvalidDespeckleChar(char),

    #[error("despeckle_filter label pass 'l' must be the last character")]
    DespeckleLabelNotLast,

    #[error("width/height must be a multiple of 8 and >= 64, got {width}x{height}")]
    BadDimensions { width: u32, height: u32 },

    #[error("camera {0:?} has no capture source configured")]
    NoCaptureSource(String),
}

#[derive(Debug, Error)]
pub enum NetcamError {
    #[error("invalid netcam URL {0:?}: {1}")]
    BadUrl(String, #[source] url::ParseError),

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[error("read timed out after {0:?}")]
    ReadTimeout(std::time::Duration),

    #[error("rtsp session error: {0}")]
    Session(#[from] retina::Error),

    #[error("stream ended")]
    StreamEnded,

    #[error("h264 decode error: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("device open failed: {0}")]
    Open(String),

    #[error("unexpected frame size: expected {expected}, got {got}")]
    SizeMismatch { expected: usize, got: usize },

    #[error("device reported fatal error: {0}")]
    Fatal(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DespeckleError {
    #[error("label count exceeded 32767, detection degraded for this frame")]
    LabelOverflow,
}
