//! Event FSM: trigger hysteresis, post-capture countdown, emulated/user
//! events, and event-end/movie-rotation logic.
//!
//! Grounded on `original_source/event.cpp`.

use std::time::{Duration, SystemTime};

use crate::frame::FrameFlags;
use crate::ring::RingBuffer;

#[derive(Debug, Clone)]
pub struct EventInfo {
    pub event_nbr: i64,
    pub camera_id: u32,
    pub started_at: SystemTime,
    pub ended_at: Option<SystemTime>,
}

pub struct EventState {
    pub event_curr_nbr: i64,
    pub event_prev_nbr: i64,
    pub event_stop: bool,
    pub detecting_motion: bool,
    pub postcap: u32,
    pub lasttime: SystemTime,
    pub started_at: Option<SystemTime>,
}

impl EventState {
    pub fn new() -> Self {
        EventState {
            event_curr_nbr: 0,
            event_prev_nbr: 0,
            event_stop: false,
            detecting_motion: false,
            postcap: 0,
            lasttime: SystemTime::UNIX_EPOCH,
            started_at: None,
        }
    }

    /// One iteration of the event FSM, called once per camera-thread frame
    /// after detection has set `MOTION`/cleared it on the current frame.
    ///
    /// Returns `true` if an event just closed this call (caller should
    /// flush the ring via `RingBuffer::process_saved`, close writers,
    /// notify the database, etc).
    #[allow(clippy::too_many_arguments)]
    pub fn step(
        &mut self,
        ring: &mut RingBuffer,
        minimum_motion_frames: usize,
        post_capture: u32,
        event_gap: u32,
        emulate_motion: bool,
        user_event_requested: bool,
        now: SystemTime,
        startup_done: bool,
    ) -> bool {
        let triggered_by_hysteresis =
            ring.motion_count_in_last(minimum_motion_frames) >= minimum_motion_frames;
        let triggered_by_emulation = startup_done && (emulate_motion || user_event_requested);
        let triggering = triggered_by_hysteresis || triggered_by_emulation;

        // Whether postcap is "settled" at zero rather than having just been
        // decremented to zero on this call -- a just-decremented postcap
        // still owes one POSTCAP frame and must not close the event yet.
        // Defaults to the entry value; each branch below corrects it for
        // what it actually did to `self.postcap`.
        let mut postcap_settled_at_zero = self.postcap == 0;

        if triggering {
            {
                let cur = ring.current_mut();
                cur.flags.insert(FrameFlags::TRIGGER);
                cur.flags.insert(FrameFlags::SAVE);
            }
            ring.mark_all_save();

            if !self.detecting_motion {
                self.started_at = Some(now);
            }
            self.postcap = post_capture;
            self.detecting_motion = true;
            self.lasttime = now;
            postcap_settled_at_zero = self.postcap == 0;
        } else if self.detecting_motion {
            if self.postcap > 0 {
                self.postcap -= 1;
                let cur = ring.current_mut();
                cur.flags.insert(FrameFlags::POSTCAP);
                cur.flags.insert(FrameFlags::SAVE);
                postcap_settled_at_zero = false;
            } else {
                ring.current_mut().flags.insert(FrameFlags::PRECAP);
                if event_gap == 0 {
                    self.event_stop = true;
                }
            }
        }

        let gap_elapsed = now
            .duration_since(self.lasttime)
            .unwrap_or(Duration::ZERO)
            .as_secs()
            >= event_gap as u64;

        let should_close = self.detecting_motion
            && self.event_curr_nbr == self.event_prev_nbr
            && (self.event_stop || (postcap_settled_at_zero && gap_elapsed));

        if should_close {
            self.detecting_motion = false;
            self.event_stop = false;
            self.event_curr_nbr += 1;
            self.event_prev_nbr = self.event_curr_nbr;
            true
        } else {
            false
        }
    }

    /// Whether the current clock second has crossed `movie_start + max_time`
    /// with no frame currently carrying a PRECAP/POSTCAP tail -- the point
    /// at which it's safe to rotate the output file mid-event.
    pub fn should_rotate_movie(
        &self,
        movie_start: SystemTime,
        max_time: Duration,
        now: SystemTime,
        current_flags: FrameFlags,
    ) -> bool {
        if max_time.is_zero() {
            return false;
        }
        let elapsed = now.duration_since(movie_start).unwrap_or(Duration::ZERO);
        elapsed >= max_time
            && !current_flags.contains(FrameFlags::PRECAP)
            && !current_flags.contains(FrameFlags::POSTCAP)
    }
}

impl Default for EventState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn feed(ring: &mut RingBuffer, motion: bool) {
        if motion {
            ring.current_mut().flags.insert(FrameFlags::MOTION);
        }
    }

    #[test]
    fn trigger_requires_minimum_motion_frames_hysteresis() {
        let mut ring = RingBuffer::new(6, 4, None);
        let mut ev = EventState::new();
        let t0 = SystemTime::UNIX_EPOCH;

        let pattern = [false, false, false, true, true, false, true, true, true];
        let mut opened_at = None;
        for (i, &m) in pattern.iter().enumerate() {
            feed(&mut ring, m);
            let now = t0 + Duration::from_secs(i as u64);
            ev.step(&mut ring, 3, 2, 1, false, false, now, true);
            if ev.detecting_motion && opened_at.is_none() {
                opened_at = Some(i);
            }
            if i + 1 < pattern.len() {
                ring.advance_in();
            }
        }
        assert_eq!(opened_at, Some(8));
    }

    #[test]
    fn event_closes_after_postcap_and_gap_elapse() {
        let mut ring = RingBuffer::new(4, 4, None);
        let mut ev = EventState::new();
        let t0 = SystemTime::UNIX_EPOCH;

        feed(&mut ring, true);
        ev.step(&mut ring, 1, 1, 0, false, false, t0, true);
        assert!(ev.detecting_motion);

        ring.advance_in();
        // no more motion; postcap counts down to 0 this call
        let closed = ev.step(
            &mut ring,
            1,
            1,
            0,
            false,
            false,
            t0 + Duration::from_secs(1),
            true,
        );
        assert!(!closed, "postcap still has one frame to consume");

        ring.advance_in();
        let closed2 = ev.step(
            &mut ring,
            1,
            1,
            0,
            false,
            false,
            t0 + Duration::from_secs(2),
            true,
        );
        assert!(closed2);
        assert_eq!(ev.event_curr_nbr, 1);
    }

    #[test]
    fn emulate_motion_forces_trigger_after_startup() {
        let mut ring = RingBuffer::new(3, 4, None);
        let mut ev = EventState::new();
        ev.step(&mut ring, 99, 0, 0, true, false, SystemTime::UNIX_EPOCH, true);
        assert!(ring.current().flags.contains(FrameFlags::TRIGGER));
    }
}
