//! Camera data model and the per-camera thread orchestration loop.
//!
//! Grounded on `original_source/camera.cpp` and `motion_loop.cpp` for the
//! data model and ten-step iteration; the thread-per-camera spawn pattern
//! follows `camera_hub::main`'s `GLOBAL_THREAD_COUNT`-tracked spawn loop.

pub mod event;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use log::{debug, info, warn};

use crate::area_detect::AreaDetector;
use crate::capture::{CaptureSource, CaptureStatus};
use crate::config::EffectiveConfig;
use crate::detect::{despeckle, diff, locator, privacy, refframe, tuning};
use crate::external::{self, Database, LoopbackWriter, MovieWriter, Overlay, PictureWriter};
use crate::frame::{FrameFlags, Location};
use crate::ring::{PreviewPolicy, RingBuffer};
use crate::schedule::{self, ScheduleAction, ScheduleEntry};

use event::{EventInfo, EventState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Init,
    Opened,
    Closed,
}

/// Cooperative control surface the supervisor uses to signal a camera
/// thread without touching its internals directly.
pub struct CameraControl {
    pub finish: AtomicBool,
    pub watchdog: AtomicU32,
    pub event_stop_requested: AtomicBool,
    pub snapshot_requested: AtomicBool,
    pub pause_requested: AtomicBool,
}

impl CameraControl {
    pub fn new(watchdog_tmo: u32) -> Arc<Self> {
        Arc::new(CameraControl {
            finish: AtomicBool::new(false),
            watchdog: AtomicU32::new(watchdog_tmo),
            event_stop_requested: AtomicBool::new(false),
            snapshot_requested: AtomicBool::new(false),
            pause_requested: AtomicBool::new(false),
        })
    }

    pub fn reset_watchdog(&self, watchdog_tmo: u32) {
        self.watchdog.store(watchdog_tmo, Ordering::SeqCst);
    }

    pub fn tick_watchdog(&self) -> u32 {
        // saturating decrement; the supervisor polls this value
        let prev = self.watchdog.load(Ordering::SeqCst);
        let next = prev.saturating_sub(1);
        self.watchdog.store(next, Ordering::SeqCst);
        next
    }

    pub fn should_finish(&self) -> bool {
        self.finish.load(Ordering::SeqCst)
    }
}

pub struct Camera {
    pub camera_id: u32,
    pub name: String,
    pub width: u32,
    pub height: u32,

    cfg: EffectiveConfig,
    control: Arc<CameraControl>,

    capture: CaptureSource,
    ring: RingBuffer,
    reference: refframe::ReferenceFrame,
    threshold_tuner: tuning::ThresholdTuner,
    area_detector: AreaDetector,
    event: EventState,

    fixed_mask: Option<Vec<u8>>,
    privacy_mask: Option<Vec<u8>>,
    privacy_or_mask: Option<Vec<u8>>,
    smartmask: Vec<u8>,
    smartmask_final: Vec<u8>,
    smartmask_buffer: Vec<i32>,
    smartmask_count: u32,

    noise: i64,
    threshold: i64,
    lastrate: u32,
    shots_this_second: u32,
    last_second_boundary: Instant,

    frame_skip: u32,
    paused: bool,
    schedule: Vec<ScheduleEntry>,

    previous_diffs: i64,
    previous_location: Location,
    previous_frame_time: Instant,

    device_status: DeviceStatus,
    lost_connection: bool,
    missing_frame_counter: u32,

    movie_writer: Option<Box<dyn MovieWriter>>,
    picture_writer: Option<Box<dyn PictureWriter>>,
    timelapse_writer: Option<Box<dyn MovieWriter>>,
    loopback_writer: Option<Box<dyn LoopbackWriter>>,
    overlay_writer: Option<Box<dyn Overlay>>,
    database: Option<Box<dyn Database>>,

    last_snapshot_at: Option<Instant>,
    last_timelapse_at: Option<Instant>,

    startup_frames_remaining: u32,

    /// Luma plane captured by `do_detection`, consumed by `do_tuning` in
    /// the same iteration to drive the reference-frame update.
    last_new_luma_for_refframe: Option<Vec<u8>>,
    /// Despeckled per-pixel motion mask from the same frame, consumed
    /// alongside `last_new_luma_for_refframe` by the reference-frame update.
    last_motion_mask_for_refframe: Option<Vec<u8>>,
}

impl Camera {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        camera_id: u32,
        name: String,
        width: u32,
        height: u32,
        cfg: EffectiveConfig,
        capture: CaptureSource,
        fixed_mask: Option<Vec<u8>>,
        privacy_mask: Option<Vec<u8>>,
        area_detect_digits: &str,
    ) -> Self {
        let size_norm = (width * height * 3 / 2) as usize;
        let motionsize = (width * height) as usize;
        let ring_capacity = (cfg.pre_capture + cfg.minimum_motion_frames).max(1) as usize;
        let privacy_or_mask = privacy_mask.as_deref().map(privacy::build_or_mask);
        let watchdog_tmo = cfg.watchdog_tmo;
        let schedule = schedule::parse(&cfg.schedule_params);

        Camera {
            camera_id,
            name,
            width,
            height,
            control: CameraControl::new(watchdog_tmo),
            capture,
            ring: RingBuffer::new(ring_capacity, size_norm, None),
            reference: refframe::ReferenceFrame::new(width as usize, height as usize),
            threshold_tuner: tuning::ThresholdTuner::new(),
            area_detector: AreaDetector::new(area_detect_digits),
            event: EventState::new(),
            fixed_mask,
            privacy_mask,
            privacy_or_mask,
            smartmask: vec![0u8; motionsize],
            smartmask_final: vec![255u8; motionsize],
            smartmask_buffer: vec![0i32; motionsize],
            smartmask_count: 0,
            noise: cfg.noise_level,
            threshold: cfg.threshold,
            lastrate: cfg.framerate,
            shots_this_second: 0,
            last_second_boundary: Instant::now(),
            frame_skip: 0,
            paused: false,
            schedule,
            previous_diffs: 0,
            previous_location: Location::default(),
            previous_frame_time: Instant::now(),
            device_status: DeviceStatus::Init,
            lost_connection: false,
            missing_frame_counter: 0,
            movie_writer: None,
            picture_writer: None,
            timelapse_writer: None,
            loopback_writer: None,
            overlay_writer: None,
            database: None,
            last_snapshot_at: None,
            last_timelapse_at: None,
            startup_frames_remaining: cfg.framerate, // one second of grace before emulate/user events fire
            last_new_luma_for_refframe: None,
            last_motion_mask_for_refframe: None,
            cfg,
        }
    }

    pub fn control(&self) -> Arc<CameraControl> {
        self.control.clone()
    }

    /// Opens the capture source and allocates everything that depends on
    /// its negotiated geometry.
    pub fn init(&mut self) -> anyhow::Result<()> {
        let (w, h) = self.capture.start()?;
        if w != 0 && h != 0 && (w != self.width || h != self.height) {
            anyhow::bail!(
                "camera {} negotiated {}x{}, expected {}x{}",
                self.name,
                w,
                h,
                self.width,
                self.height
            );
        }
        self.device_status = DeviceStatus::Opened;
        info!("[{}] camera opened at {}x{}", self.name, self.width, self.height);
        Ok(())
    }

    /// Runs one full frame iteration (steps 2-10). Returns `false` when the
    /// camera has been asked to finish.
    pub fn iterate(&mut self) -> anyhow::Result<bool> {
        if self.control.should_finish() {
            return Ok(false);
        }
        self.control.reset_watchdog(self.cfg.watchdog_tmo);

        if self.device_status == DeviceStatus::Closed {
            // step 1: a fatal capture error closed the device last
            // iteration; re-open it before doing anything else.
            self.init()?;
        }

        self.prepare();
        self.ring.advance_in();
        self.ring.current_mut().reset_for_reuse();

        let capture_status = self.do_capture();
        self.do_detection(capture_status);
        self.do_tuning();
        self.do_actions();

        self.check_schedule();
        self.overlay();
        self.snapshot();
        self.timelapse();
        self.loopback();

        self.frametiming();
        Ok(true)
    }

    fn prepare(&mut self) {
        if self.last_second_boundary.elapsed() >= Duration::from_secs(1) {
            self.lastrate = self.shots_this_second + 1;
            self.shots_this_second = 0;
            self.last_second_boundary = Instant::now();
        }
    }

    fn do_capture(&mut self) -> CaptureStatus {
        let now = SystemTime::now();
        let status = {
            let frame = self.ring.current_mut();
            frame.imgts = now;
            self.capture.next(frame)
        };

        match status {
            CaptureStatus::Success => {
                if self.lost_connection {
                    info!("[{}] camera recovered", self.name);
                    let _ = external::run_user_script(&self.cfg.on_camera_found, Path::new(&self.name));
                }
                self.lost_connection = false;
                self.missing_frame_counter = 0;

                if let (Some(mask), Some(or_mask)) =
                    (self.privacy_mask.as_deref(), self.privacy_or_mask.as_deref())
                {
                    let luma_len = (self.width * self.height) as usize;
                    let chroma_len = luma_len / 2;
                    let frame = self.ring.current_mut();
                    let (luma, chroma) = frame.image_norm.split_at_mut(luma_len);
                    let chroma = &mut chroma[..chroma_len];
                    privacy::apply_privacy_mask(luma, chroma, mask, or_mask, self.width as usize);
                }
            }
            CaptureStatus::NothingNew => {
                self.missing_frame_counter += 1;
                let device_tmo_frames = self.cfg.device_tmo * self.cfg.framerate.max(1);
                if self.missing_frame_counter > device_tmo_frames && !self.lost_connection {
                    warn!("[{}] connection lost", self.name);
                    self.lost_connection = true;
                    let _ = external::run_user_script(&self.cfg.on_camera_lost, Path::new(&self.name));
                }
                self.capture.noimage(self.ring.current_mut());
            }
            CaptureStatus::Fatal => {
                warn!("[{}] fatal capture error, will re-init", self.name);
                self.device_status = DeviceStatus::Closed;
            }
        }
        status
    }

    fn do_detection(&mut self, capture_status: CaptureStatus) {
        if capture_status != CaptureStatus::Success {
            return;
        }
        if self.startup_frames_remaining > 0 {
            self.startup_frames_remaining -= 1;
        }

        if self.frame_skip > 0 {
            self.frame_skip -= 1;
            self.ring.current_mut().diffs = 0;
            self.shots_this_second += 1;
            return;
        }

        if self.paused {
            self.shots_this_second += 1;
            return;
        }

        let luma_len = (self.width * self.height) as usize;
        let new_luma = self.ring.current().image_norm[..luma_len].to_vec();

        if !tuning::fast_precheck(
            &self.reference.reference,
            &new_luma,
            self.noise,
            self.threshold,
            luma_len,
        ) && !self.event.detecting_motion
        {
            self.shots_this_second += 1;
            return;
        }

        let fixed_mask = self.fixed_mask.as_deref();
        let smart_mask = if self.cfg.smart_mask_speed > 0 {
            Some(self.smartmask_final.as_slice())
        } else {
            None
        };
        let event_changed = self.event.event_curr_nbr != self.event.event_prev_nbr;

        let mut motion_mask = vec![0u8; luma_len];
        let result = diff::diff(
            &self.reference.reference,
            &new_luma,
            &mut motion_mask,
            fixed_mask,
            smart_mask,
            if self.cfg.smart_mask_speed > 0 {
                Some(self.smartmask_buffer.as_mut_slice())
            } else {
                None
            },
            event_changed,
            self.noise,
            self.cfg.threshold_ratio_change,
        );

        let label_result = despeckle::despeckle(
            &mut motion_mask,
            self.width as usize,
            self.height as usize,
            &self.cfg.despeckle_filter,
            self.threshold,
        );

        let diffs = match label_result {
            Ok(Some(labels)) => {
                if labels.labelgroup_max > 0 {
                    labels.labelgroup_max as i64
                } else {
                    labels.labelsize_max as i64
                }
            }
            Ok(None) => result.diffs,
            Err(e) => {
                warn!("[{}] despeckle label overflow: {e}", self.name);
                result.diffs
            }
        };

        let is_motion = diffs > self.threshold
            && (self.cfg.threshold_maximum == 0 || diffs < self.cfg.threshold_maximum);

        if tuning::is_lightswitch(diffs, luma_len, self.cfg.lightswitch_percent) {
            self.trigger_lightswitch(&new_luma);
            self.shots_this_second += 1;
            return;
        }

        {
            let frame = self.ring.current_mut();
            frame.diffs = diffs;
            frame.diffs_raw = result.diffs;
            frame.diffs_ratio = result.diffs_ratio;
            if is_motion {
                frame.flags.insert(FrameFlags::MOTION);
            }
        }

        if is_motion {
            if let Some(loc) = locator::locate(&motion_mask, self.width as i32, self.height as i32) {
                let frame_cx = self.width as i32 / 2;
                let frame_cy = self.height as i32 / 2;
                let dx = loc.x - frame_cx;
                let dy = loc.y - frame_cy;
                {
                    let frame = self.ring.current_mut();
                    frame.cent_dist = (dx as i64) * (dx as i64) + (dy as i64) * (dy as i64);
                    frame.location = loc;
                }

                if self.area_detector.check(loc.x, loc.y, self.width as i32, self.height as i32) {
                    debug!("[{}] area-detect fired in grid cell", self.name);
                }

                let now = Instant::now();
                let elapsed = now.duration_since(self.previous_frame_time).as_secs_f64();
                let pdx = loc.x - self.previous_location.x;
                let pdy = loc.y - self.previous_location.y;
                if tuning::is_micro_lightswitch(
                    diffs,
                    self.previous_diffs,
                    pdx,
                    pdy,
                    self.width as i32,
                    self.height as i32,
                    elapsed,
                ) {
                    self.trigger_lightswitch(&new_luma);
                    self.ring.current_mut().flags.remove(FrameFlags::MOTION);
                    self.previous_diffs = diffs;
                    self.previous_location = loc;
                    self.previous_frame_time = now;
                    self.shots_this_second += 1;
                    return;
                }

                self.previous_diffs = diffs;
                self.previous_location = loc;
                self.previous_frame_time = now;
            }
        }

        self.last_motion_mask_for_refframe = Some(motion_mask);
        self.last_new_luma_for_refframe = Some(new_luma);
        self.shots_this_second += 1;
    }

    /// Resets the reference frame to the current image and arms
    /// `frame_skip` so the next `lightswitch_frames` frames are detected
    /// against the fresh reference without re-triggering motion.
    /// `original_source/alg.cpp`'s `alg_lightswitch`.
    fn trigger_lightswitch(&mut self, new_luma: &[u8]) {
        self.reference.reset(new_luma);
        self.ring.current_mut().diffs = 0;
        self.frame_skip = self.cfg.lightswitch_frames;
    }

    fn do_tuning(&mut self) {
        let Some(new_luma) = self.last_new_luma_for_refframe.take() else {
            return;
        };
        let Some(motion_mask) = self.last_motion_mask_for_refframe.take() else {
            return;
        };
        let diffs = self.ring.current().diffs;
        let motion_detected = self.ring.current().flags.contains(FrameFlags::MOTION);

        if self.cfg.noise_tune && !motion_detected && diffs <= self.threshold {
            self.noise = tuning::noise_tune(
                &self.reference.reference,
                &new_luma,
                &self.smartmask_final,
                self.noise,
            );
        }

        if self.cfg.threshold_tune {
            self.threshold = self
                .threshold_tuner
                .update(diffs, motion_detected, self.threshold);
        }

        self.maybe_tune_smartmask();

        let accept_timer = refframe::accept_timer(self.lastrate, 10);
        self.reference.update(
            &new_luma,
            &motion_mask,
            &self.smartmask_final,
            self.noise,
            accept_timer,
        );
    }

    /// Runs [`tuning::tune_smartmask`] once every `smartmask_ratio` frames
    /// (`smartmask_count` is the countdown to the next run, re-armed to
    /// `5 * lastrate * (11 - smart_mask_speed)` per
    /// `original_source/motion_loop.cpp`), gated the way `alg_tune_smartmask`
    /// gates it in `original_source/alg.cpp`: only while smart masking is
    /// enabled, and only while no event boundary was just crossed this
    /// frame (`event_curr_nbr == event_prev_nbr`).
    fn maybe_tune_smartmask(&mut self) {
        if self.cfg.smart_mask_speed == 0 {
            return;
        }
        if self.event.event_curr_nbr != self.event.event_prev_nbr {
            return;
        }

        if self.smartmask_count > 0 {
            self.smartmask_count -= 1;
            return;
        }
        self.smartmask_count = 5 * self.lastrate * (11 - self.cfg.smart_mask_speed);

        tuning::tune_smartmask(
            &mut self.smartmask,
            &mut self.smartmask_final,
            &mut self.smartmask_buffer,
            self.width as usize,
            self.height as usize,
            self.lastrate,
            self.cfg.smart_mask_speed,
        );
    }

    fn do_actions(&mut self) {
        let now = SystemTime::now();
        let was_detecting = self.event.detecting_motion;
        let user_event = self.control.event_stop_requested.swap(false, Ordering::SeqCst);
        let closed = self.event.step(
            &mut self.ring,
            self.cfg.minimum_motion_frames as usize,
            self.cfg.post_capture,
            self.cfg.event_gap,
            self.cfg.emulate_motion,
            user_event,
            now,
            self.startup_frames_remaining == 0,
        );

        if !was_detecting && self.event.detecting_motion {
            let arg = self.event_script_arg(self.event.event_curr_nbr);
            let _ = external::run_user_script(&self.cfg.on_motion_detected, &arg);
        }

        let writer = &mut self.movie_writer;
        let policy = match self.cfg.picture_output.as_str() {
            "best" => PreviewPolicy::Best,
            "center" => PreviewPolicy::Center,
            "first" => PreviewPolicy::First,
            _ => PreviewPolicy::Off,
        };
        self.ring.process_saved(policy, |frame| {
            if let Some(w) = writer.as_mut() {
                let _ = w.put_image(frame);
            }
        });

        if closed {
            self.area_detector.reset_for_new_event();
            if let Some(w) = self.movie_writer.as_mut() {
                let _ = w.close();
            }

            let event_nbr = self.event.event_prev_nbr;
            let started_at = self.event.started_at.unwrap_or(now);
            let info = EventInfo {
                event_nbr,
                camera_id: self.camera_id,
                started_at,
                ended_at: Some(now),
            };
            let arg = self.event_script_arg(event_nbr);
            if let Some(db) = self.database.as_mut() {
                if let Err(e) = db.exec(&info) {
                    warn!("[{}] database notify failed for event {event_nbr}: {e}", self.name);
                }
                if let Err(e) = db.filelist_add(event_nbr, &arg, "movie") {
                    warn!("[{}] database filelist_add failed for event {event_nbr}: {e}", self.name);
                }
            }

            let _ = external::run_user_script(&self.cfg.on_event_end, &arg);

            info!("[{}] event {event_nbr} closed", self.name);
        }
    }

    /// Builds the path argument passed to user scripts and recorded via
    /// `Database::filelist_add`, mirroring the legacy shell-out contract of
    /// one file path per event (`original_source/event.cpp`).
    fn event_script_arg(&self, event_nbr: i64) -> PathBuf {
        PathBuf::from(format!("{}/{}-{event_nbr}", self.cfg.target_dir, self.name))
    }

    /// Draws masks/diff-count/text overlays on the current frame before
    /// it's handed to any writer. Grounded on `original_source/draw.cpp`.
    fn overlay(&mut self) {
        if let Some(overlay) = self.overlay_writer.as_mut() {
            let frame = self.ring.current_mut();
            if let Err(e) = overlay.draw(frame) {
                warn!("[{}] overlay draw failed: {e}", self.name);
            }
        }
    }

    /// Step 7/9: writes a still picture every `snapshot_interval` seconds,
    /// independent of motion. `original_source/picture.cpp`'s snapshot path.
    fn snapshot(&mut self) {
        let requested = self.control.snapshot_requested.swap(false, Ordering::SeqCst);
        let interval_elapsed = self.cfg.snapshot_interval > 0
            && self
                .last_snapshot_at
                .map_or(true, |t| t.elapsed() >= Duration::from_secs(self.cfg.snapshot_interval as u64));

        if !requested && !interval_elapsed {
            return;
        }

        let path = PathBuf::from(format!("{}/{}-snapshot.jpg", self.cfg.target_dir, self.name));
        if let Some(writer) = self.picture_writer.as_mut() {
            if let Err(e) = writer.write(self.ring.current(), &path) {
                warn!("[{}] snapshot write failed: {e}", self.name);
            }
        }
        self.last_snapshot_at = Some(Instant::now());
    }

    /// Step 9: appends one frame to the rolling timelapse movie every
    /// `timelapse_interval` seconds. `original_source/movie.cpp`'s
    /// timelapse output kind.
    fn timelapse(&mut self) {
        if self.cfg.timelapse_interval == 0 {
            return;
        }
        let due = self
            .last_timelapse_at
            .map_or(true, |t| t.elapsed() >= Duration::from_secs(self.cfg.timelapse_interval as u64));
        if !due {
            return;
        }
        if let Some(writer) = self.timelapse_writer.as_mut() {
            if let Err(e) = writer.put_image(self.ring.current()) {
                warn!("[{}] timelapse write failed: {e}", self.name);
            }
        }
        self.last_timelapse_at = Some(Instant::now());
    }

    /// Step 9: mirrors the current frame to a video-loopback device
    /// (`video_pipe`) regardless of motion state. `original_source/video_loopback.cpp`.
    fn loopback(&mut self) {
        if self.cfg.video_pipe == "-" {
            return;
        }
        if let Some(writer) = self.loopback_writer.as_mut() {
            if let Err(e) = writer.write_frame(self.ring.current()) {
                warn!("[{}] loopback write failed: {e}", self.name);
            }
        }
    }

    /// Step 9: applies `schedule_params` day/time windows, pausing
    /// detection (and, for a `stop` window, fully suppressing it) without
    /// tearing down the capture source. `original_source/conf.cpp`'s
    /// schedule option; a `pause` window with its `detect` sub-flag set
    /// keeps detection running (only recording-side behaviour would pause,
    /// which is out of scope here), while `stop` always suppresses
    /// detection.
    fn check_schedule(&mut self) {
        let control_paused = self.control.pause_requested.load(Ordering::SeqCst);
        let schedule_paused = match schedule::active_action(&self.schedule, chrono::Local::now()) {
            Some((ScheduleAction::Stop, _)) => true,
            Some((ScheduleAction::Pause, detect)) => !detect,
            None => false,
        };
        self.paused = control_paused || schedule_paused;
    }

    fn frametiming(&mut self) {
        let target = Duration::from_secs_f64(1.0 / self.cfg.framerate.max(1) as f64);
        std::thread::sleep(target);
    }
}
