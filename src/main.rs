//! Entry point: CLI parsing, config load, signal installation, and handing
//! off to the [`Supervisor`]. Grounded on `camera_hub::main`'s
//! `docopt`-parsed `Args` + `env_logger::init()` shape.

#[macro_use]
extern crate log;

use std::path::{Path, PathBuf};

use docopt::Docopt;
use serde::Deserialize;

use motionplus_core::camera::Camera;
use motionplus_core::capture::file::FileCapture;
use motionplus_core::capture::CaptureSource;
use motionplus_core::config::{Config, SourceConfig};
use motionplus_core::netcam::handler::NetcamHandle;
use motionplus_core::supervisor::{install_signal_handlers, Supervisor};

const USAGE: &str = "
motionplusd: multi-camera motion detection and recording daemon.

Usage:
  motionplusd [--config=<file>] [--check-config]
  motionplusd (-h | --help)
  motionplusd --version

Options:
  -h --help          Show this help text.
  --version          Show version and exit.
  --config=<file>    Path to the YAML config file [default: motionplus.yaml].
  --check-config     Validate the config file and exit.
";

#[derive(Debug, Deserialize)]
struct Args {
    flag_config: String,
    flag_check_config: bool,
    flag_version: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    if args.flag_version {
        println!("motionplusd {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config_path = PathBuf::from(&args.flag_config);
    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!("config error: {e}");
            std::process::exit(2);
        }
    };

    if args.flag_check_config {
        info!("config at {:?} is valid ({} cameras)", config_path, config.cameras.len());
        return Ok(());
    }

    install_signal_handlers();

    let defaults = config.defaults.clone();
    let cameras_by_id: std::collections::HashMap<u32, motionplus_core::config::CameraConfig> =
        config.cameras.iter().cloned().map(|c| (c.camera_id, c)).collect();

    let supervisor = Supervisor::new();
    supervisor.run(config, move |camera_id| {
        let cam_cfg = cameras_by_id
            .get(&camera_id)
            .ok_or_else(|| anyhow::anyhow!("unknown camera id {camera_id}"))?;
        build_camera(cam_cfg, &defaults)
    })?;

    Ok(())
}

fn build_camera(
    cam_cfg: &motionplus_core::config::CameraConfig,
    defaults: &motionplus_core::config::Defaults,
) -> anyhow::Result<Camera> {
    let effective = cam_cfg.effective(defaults);

    let capture = match &cam_cfg.source {
        SourceConfig::File { path, loop_playback } => {
            CaptureSource::File(FileCapture::new(Path::new(path).to_path_buf(), *loop_playback))
        }
        SourceConfig::Libcam { device } => CaptureSource::Libcam(
            motionplus_core::capture::libcam::LibcamCapture::new(
                device.clone(),
                cam_cfg.width,
                cam_cfg.height,
                effective.framerate,
            ),
        ),
        #[cfg(target_os = "linux")]
        SourceConfig::V4l2 { device, .. } => CaptureSource::V4l2(
            motionplus_core::capture::v4l2::V4l2Capture::new(device.clone(), cam_cfg.width, cam_cfg.height),
        ),
        #[cfg(not(target_os = "linux"))]
        SourceConfig::V4l2 { .. } => {
            anyhow::bail!("V4L2 capture is only available on Linux")
        }
        SourceConfig::Netcam {
            url,
            userpass,
            ..
        } => {
            let handle = NetcamHandle::new(false);
            motionplus_core::netcam::handler::spawn(
                cam_cfg.name.clone(),
                url.clone(),
                userpass.clone(),
                handle.clone(),
            );
            CaptureSource::Netcam(handle, 0)
        }
    };

    let fixed_mask = cam_cfg
        .mask_file
        .as_ref()
        .map(|p| motionplus_core::detect::privacy::load_mask(Path::new(p), cam_cfg.width, cam_cfg.height))
        .transpose()?;
    let privacy_mask = cam_cfg
        .mask_privacy
        .as_ref()
        .map(|p| motionplus_core::detect::privacy::load_mask(Path::new(p), cam_cfg.width, cam_cfg.height))
        .transpose()?;

    Ok(Camera::new(
        cam_cfg.camera_id,
        cam_cfg.name.clone(),
        cam_cfg.width,
        cam_cfg.height,
        effective,
        capture,
        fixed_mask,
        privacy_mask,
        &cam_cfg.area_detect,
    ))
}
