//! Configuration loading and validation.
//!
//! The wire format is YAML (`serde_yaml2`), the same crate
//! `camera_hub::ip::ip_camera` uses for `cameras.yaml`, rather than the
//! original project's bespoke key-value config file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_framerate() -> u32 {
    15
}
fn default_pre_capture() -> u32 {
    3
}
fn default_post_capture() -> u32 {
    3
}
fn default_minimum_motion_frames() -> u32 {
    1
}
fn default_event_gap() -> u32 {
    60
}
fn default_threshold() -> i64 {
    1500
}
fn default_threshold_maximum() -> i64 {
    0
}
fn default_threshold_ratio() -> i64 {
    2
}
fn default_threshold_ratio_change() -> i64 {
    3
}
fn default_noise_level() -> i64 {
    32
}
fn default_lightswitch_percent() -> u32 {
    0
}
fn default_lightswitch_frames() -> u32 {
    1
}
fn default_despeckle_filter() -> String {
    "EedD".to_string()
}
fn default_watchdog_tmo() -> u32 {
    90
}
fn default_watchdog_kill() -> u32 {
    10
}
fn default_device_tmo() -> u32 {
    30
}
fn default_picture_output() -> String {
    "off".to_string()
}
fn default_smart_mask_speed() -> u32 {
    0
}
fn default_video_pipe() -> String {
    "-".to_string()
}

/// Options shared by every camera unless overridden per-camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_framerate")]
    pub framerate: u32,
    #[serde(default = "default_pre_capture")]
    pub pre_capture: u32,
    #[serde(default = "default_post_capture")]
    pub post_capture: u32,
    #[serde(default = "default_minimum_motion_frames")]
    pub minimum_motion_frames: u32,
    #[serde(default = "default_event_gap")]
    pub event_gap: u32,
    #[serde(default = "default_threshold")]
    pub threshold: i64,
    #[serde(default = "default_threshold_maximum")]
    pub threshold_maximum: i64,
    #[serde(default)]
    pub threshold_tune: bool,
    #[serde(default = "default_threshold_ratio")]
    pub threshold_ratio: i64,
    #[serde(default = "default_threshold_ratio_change")]
    pub threshold_ratio_change: i64,
    #[serde(default = "default_noise_level")]
    pub noise_level: i64,
    #[serde(default)]
    pub noise_tune: bool,
    #[serde(default = "default_smart_mask_speed")]
    pub smart_mask_speed: u32,
    #[serde(default = "default_lightswitch_percent")]
    pub lightswitch_percent: u32,
    #[serde(default = "default_lightswitch_frames")]
    pub lightswitch_frames: u32,
    #[serde(default = "default_despeckle_filter")]
    pub despeckle_filter: String,
    #[serde(default = "default_picture_output")]
    pub picture_output: String,
    #[serde(default = "default_watchdog_tmo")]
    pub watchdog_tmo: u32,
    #[serde(default = "default_watchdog_kill")]
    pub watchdog_kill: u32,
    #[serde(default = "default_device_tmo")]
    pub device_tmo: u32,
    #[serde(default)]
    pub emulate_motion: bool,
    #[serde(default = "default_target_dir")]
    pub target_dir: String,

    #[serde(default)]
    pub snapshot_interval: u32,
    #[serde(default)]
    pub timelapse_interval: u32,
    #[serde(default = "default_video_pipe")]
    pub video_pipe: String,
    #[serde(default)]
    pub schedule_params: String,

    #[serde(default)]
    pub on_event_end: String,
    #[serde(default)]
    pub on_motion_detected: String,
    #[serde(default)]
    pub on_camera_found: String,
    #[serde(default)]
    pub on_camera_lost: String,
}

fn default_target_dir() -> String {
    "/var/lib/motionplus".to_string()
}

impl Default for Defaults {
    fn default() -> Self {
        Defaults {
            framerate: default_framerate(),
            pre_capture: default_pre_capture(),
            post_capture: default_post_capture(),
            minimum_motion_frames: default_minimum_motion_frames(),
            event_gap: default_event_gap(),
            threshold: default_threshold(),
            threshold_maximum: default_threshold_maximum(),
            threshold_tune: false,
            threshold_ratio: default_threshold_ratio(),
            threshold_ratio_change: default_threshold_ratio_change(),
            noise_level: default_noise_level(),
            noise_tune: false,
            smart_mask_speed: default_smart_mask_speed(),
            lightswitch_percent: default_lightswitch_percent(),
            lightswitch_frames: default_lightswitch_frames(),
            despeckle_filter: default_despeckle_filter(),
            picture_output: default_picture_output(),
            watchdog_tmo: default_watchdog_tmo(),
            watchdog_kill: default_watchdog_kill(),
            device_tmo: default_device_tmo(),
            emulate_motion: false,
            target_dir: default_target_dir(),
            snapshot_interval: 0,
            timelapse_interval: 0,
            video_pipe: default_video_pipe(),
            schedule_params: String::new(),
            on_event_end: String::new(),
            on_motion_detected: String::new(),
            on_camera_found: String::new(),
            on_camera_lost: String::new(),
        }
    }
}

/// Where a camera's frames come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    V4l2 {
        device: String,
        #[serde(default)]
        palette: Option<String>,
    },
    Libcam {
        device: String,
    },
    Netcam {
        url: String,
        #[serde(default)]
        highres_url: Option<String>,
        #[serde(default)]
        userpass: Option<String>,
        #[serde(default)]
        use_tcp: bool,
        #[serde(default)]
        keepalive: bool,
    },
    File {
        path: String,
        #[serde(default)]
        loop_playback: bool,
    },
}

/// One camera's full configuration, after merging against [`Defaults`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub name: String,
    pub camera_id: u32,
    pub width: u32,
    pub height: u32,

    pub source: SourceConfig,

    #[serde(default)]
    pub mask_file: Option<String>,
    #[serde(default)]
    pub mask_privacy: Option<String>,

    #[serde(default)]
    pub area_detect: String,

    #[serde(flatten)]
    pub defaults: Option<DefaultsOverride>,
}

/// Per-camera overrides of the shared [`Defaults`]; every field is optional
/// so a camera only needs to name what it changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsOverride {
    pub framerate: Option<u32>,
    pub pre_capture: Option<u32>,
    pub post_capture: Option<u32>,
    pub minimum_motion_frames: Option<u32>,
    pub event_gap: Option<u32>,
    pub threshold: Option<i64>,
    pub threshold_maximum: Option<i64>,
    pub threshold_tune: Option<bool>,
    pub noise_level: Option<i64>,
    pub noise_tune: Option<bool>,
    pub smart_mask_speed: Option<u32>,
    pub lightswitch_percent: Option<u32>,
    pub lightswitch_frames: Option<u32>,
    pub despeckle_filter: Option<String>,
    pub picture_output: Option<String>,
    pub watchdog_tmo: Option<u32>,
    pub watchdog_kill: Option<u32>,
    pub device_tmo: Option<u32>,
    pub emulate_motion: Option<bool>,
    pub target_dir: Option<String>,

    pub snapshot_interval: Option<u32>,
    pub timelapse_interval: Option<u32>,
    pub video_pipe: Option<String>,
    pub schedule_params: Option<String>,

    pub on_event_end: Option<String>,
    pub on_motion_detected: Option<String>,
    pub on_camera_found: Option<String>,
    pub on_camera_lost: Option<String>,
}

/// A [`Defaults`] merged with a camera's [`DefaultsOverride`]; this is what
/// the camera thread actually reads from.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub framerate: u32,
    pub pre_capture: u32,
    pub post_capture: u32,
    pub minimum_motion_frames: u32,
    pub event_gap: u32,
    pub threshold: i64,
    pub threshold_maximum: i64,
    pub threshold_tune: bool,
    pub threshold_ratio: i64,
    pub threshold_ratio_change: i64,
    pub noise_level: i64,
    pub noise_tune: bool,
    pub smart_mask_speed: u32,
    pub lightswitch_percent: u32,
    pub lightswitch_frames: u32,
    pub despeckle_filter: String,
    pub picture_output: String,
    pub watchdog_tmo: u32,
    pub watchdog_kill: u32,
    pub device_tmo: u32,
    pub emulate_motion: bool,
    pub target_dir: String,

    pub snapshot_interval: u32,
    pub timelapse_interval: u32,
    pub video_pipe: String,
    pub schedule_params: String,

    pub on_event_end: String,
    pub on_motion_detected: String,
    pub on_camera_found: String,
    pub on_camera_lost: String,
}

impl Defaults {
    pub fn merge(&self, over: &Option<DefaultsOverride>) -> EffectiveConfig {
        let o = over.clone().unwrap_or_default();
        EffectiveConfig {
            framerate: o.framerate.unwrap_or(self.framerate),
            pre_capture: o.pre_capture.unwrap_or(self.pre_capture),
            post_capture: o.post_capture.unwrap_or(self.post_capture),
            minimum_motion_frames: o
                .minimum_motion_frames
                .unwrap_or(self.minimum_motion_frames),
            event_gap: o.event_gap.unwrap_or(self.event_gap),
            threshold: o.threshold.unwrap_or(self.threshold),
            threshold_maximum: o.threshold_maximum.unwrap_or(self.threshold_maximum),
            threshold_tune: o.threshold_tune.unwrap_or(self.threshold_tune),
            threshold_ratio: self.threshold_ratio,
            threshold_ratio_change: self.threshold_ratio_change,
            noise_level: o.noise_level.unwrap_or(self.noise_level),
            noise_tune: o.noise_tune.unwrap_or(self.noise_tune),
            smart_mask_speed: o.smart_mask_speed.unwrap_or(self.smart_mask_speed),
            lightswitch_percent: o.lightswitch_percent.unwrap_or(self.lightswitch_percent),
            lightswitch_frames: o.lightswitch_frames.unwrap_or(self.lightswitch_frames),
            despeckle_filter: o.despeckle_filter.unwrap_or_else(|| self.despeckle_filter.clone()),
            picture_output: o.picture_output.unwrap_or_else(|| self.picture_output.clone()),
            watchdog_tmo: o.watchdog_tmo.unwrap_or(self.watchdog_tmo),
            watchdog_kill: o.watchdog_kill.unwrap_or(self.watchdog_kill),
            device_tmo: o.device_tmo.unwrap_or(self.device_tmo),
            emulate_motion: o.emulate_motion.unwrap_or(self.emulate_motion),
            target_dir: o.target_dir.unwrap_or_else(|| self.target_dir.clone()),
            snapshot_interval: o.snapshot_interval.unwrap_or(self.snapshot_interval),
            timelapse_interval: o.timelapse_interval.unwrap_or(self.timelapse_interval),
            video_pipe: o.video_pipe.unwrap_or_else(|| self.video_pipe.clone()),
            schedule_params: o.schedule_params.unwrap_or_else(|| self.schedule_params.clone()),
            on_event_end: o.on_event_end.unwrap_or_else(|| self.on_event_end.clone()),
            on_motion_detected: o.on_motion_detected.unwrap_or_else(|| self.on_motion_detected.clone()),
            on_camera_found: o.on_camera_found.unwrap_or_else(|| self.on_camera_found.clone()),
            on_camera_lost: o.on_camera_lost.unwrap_or_else(|| self.on_camera_lost.clone()),
        }
    }
}

/// Top-level config document: shared defaults plus the camera list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,
    pub cameras: Vec<CameraConfig>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let cfg: Config = serde_yaml2::from_str(&text).map_err(|err| ConfigError::Parse {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        for cam in &cfg.cameras {
            cam.validate()?;
        }
        Ok(cfg)
    }
}

impl CameraConfig {
    /// Eagerly rejects malformed `area_detect` and `despeckle_filter`
    /// strings at load time instead of the legacy wrap-on-subtract/silent
    /// skip behaviour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width < 64 || self.height < 64 || self.width % 8 != 0 || self.height % 8 != 0 {
            return Err(ConfigError::BadDimensions {
                width: self.width,
                height: self.height,
            });
        }

        for c in self.area_detect.chars() {
            if !('1'..='9').contains(&c) {
                return Err(ConfigError::InvalidAreaDetectDigit(c));
            }
        }

        let filter = self
            .defaults
            .as_ref()
            .and_then(|d| d.despeckle_filter.as_deref())
            .unwrap_or(default_despeckle_filter().as_str())
            .to_string();
        validate_despeckle_filter(&filter)?;

        Ok(())
    }

    pub fn effective(&self, defaults: &Defaults) -> EffectiveConfig {
        defaults.merge(&self.defaults)
    }
}

/// Shared by config validation and the despeckle engine itself, so a
/// recipe string is checked once at load time and trusted thereafter.
pub fn validate_despeckle_filter(filter: &str) -> Result<(), ConfigError> {
    let chars: Vec<char> = filter.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if !matches!(c, 'E' | 'e' | 'D' | 'd' | 'l') {
            return Err(ConfigError::InvalidDespeckleChar(c));
        }
        if c == 'l' && i != chars.len() - 1 {
            return Err(ConfigError::DespeckleLabelNotLast);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_camera() -> CameraConfig {
        CameraConfig {
            name: "front".to_string(),
            camera_id: 1,
            width: 640,
            height: 480,
            source: SourceConfig::File {
                path: "/tmp/frames".to_string(),
                loop_playback: false,
            },
            mask_file: None,
            mask_privacy: None,
            area_detect: String::new(),
            defaults: None,
        }
    }

    #[test]
    fn rejects_non_multiple_of_8_dimensions() {
        let mut cam = base_camera();
        cam.width = 641;
        assert!(matches!(
            cam.validate(),
            Err(ConfigError::BadDimensions { .. })
        ));
    }

    #[test]
    fn rejects_bad_area_detect_digit() {
        let mut cam = base_camera();
        cam.area_detect = "1a3".to_string();
        assert!(matches!(
            cam.validate(),
            Err(ConfigError::InvalidAreaDetectDigit('a'))
        ));
    }

    #[test]
    fn accepts_valid_area_detect_digits() {
        let mut cam = base_camera();
        cam.area_detect = "159".to_string();
        assert!(cam.validate().is_ok());
    }

    #[test]
    fn despeckle_label_must_be_last() {
        assert!(validate_despeckle_filter("lE").is_err());
        assert!(validate_despeckle_filter("El").is_ok());
        assert!(validate_despeckle_filter("EeDdl").is_ok());
        assert!(validate_despeckle_filter("Ex").is_err());
    }

    #[test]
    fn merge_prefers_override_over_default() {
        let defaults = Defaults::default();
        let over = DefaultsOverride {
            threshold: Some(999),
            ..Default::default()
        };
        let eff = defaults.merge(&Some(over));
        assert_eq!(eff.threshold, 999);
        assert_eq!(eff.framerate, defaults.framerate);
    }
}
