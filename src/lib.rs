//! Core capture/detect/record library for a multi-camera motion-detection
//! daemon: per-camera capture threads, reference-frame differencing,
//! despeckle/locate/privacy-mask post-processing, an event state machine
//! with a pre/post-capture ring, and an RTSP netcam handler with passthrough
//! packet buffering.

pub mod area_detect;
pub mod camera;
pub mod capture;
pub mod config;
pub mod detect;
pub mod error;
pub mod external;
pub mod frame;
pub mod netcam;
pub mod ring;
pub mod schedule;
pub mod supervisor;
