//! End-to-end scenario tests exercised against the crate's public API
//! rather than internals.

use std::time::{Duration, SystemTime};

use motionplus_core::camera::event::EventState;
use motionplus_core::detect::despeckle;
use motionplus_core::detect::privacy;
use motionplus_core::frame::FrameFlags;
use motionplus_core::netcam::packet_ring::NetcamPacketRing;
use motionplus_core::ring::RingBuffer;

/// S1: trigger hysteresis plus pre-capture window.
#[test]
fn s1_trigger_hysteresis_and_precapture() {
    let mut ring = RingBuffer::new(12, 4, None);
    let mut ev = EventState::new();
    let t0 = SystemTime::UNIX_EPOCH;

    // Q,Q,Q,M,M,Q,M,M,M,Q,Q,Q
    let pattern = [
        false, false, false, true, true, false, true, true, true, false, false, false,
    ];

    let mut event_opened_at_frame = None;
    let mut event_closed_at_frame = None;

    for (i, &motion) in pattern.iter().enumerate() {
        if motion {
            ring.current_mut().flags.insert(FrameFlags::MOTION);
        }
        let now = t0 + Duration::from_secs(i as u64);
        let closed = ev.step(&mut ring, 3, 2, 1, false, false, now, true);

        if ev.detecting_motion && event_opened_at_frame.is_none() {
            event_opened_at_frame = Some(i);
        }
        if closed && event_closed_at_frame.is_none() {
            event_closed_at_frame = Some(i);
        }

        if i + 1 < pattern.len() {
            ring.advance_in();
        }
    }

    // 3 of the last 3 frames are motion first at index 8 (frames 6,7,8 all M).
    assert_eq!(event_opened_at_frame, Some(8));
    assert!(event_closed_at_frame.is_some());
}

/// S2: a 50%+ frame-wide diff triggers light-switch suppression.
#[test]
fn s2_lightswitch_suppresses_and_resets_reference() {
    use motionplus_core::detect::{refframe, tuning};

    let motionsize = 100;
    let diffs = 60; // 60% of 100
    assert!(tuning::is_lightswitch(diffs, motionsize, 50));

    let mut rf = refframe::ReferenceFrame::new(10, 10);
    rf.reference = vec![10u8; motionsize];
    let virgin = vec![200u8; motionsize];
    rf.reset(&virgin);
    assert_eq!(rf.reference, virgin);
}

/// S3: despeckle erases an isolated speckle but keeps a solid block, with
/// exactly one label once 'l' is appended.
#[test]
fn s3_despeckle_eedd_clears_speckle_keeps_block() {
    let width = 16;
    let height = 16;
    let mut mask = vec![0u8; width * height];
    mask[5 * width + 5] = 1; // isolated speckle

    for y in 10..15 {
        for x in 10..15 {
            mask[y * width + x] = 1;
        }
    }

    let result = despeckle::despeckle(&mut mask, width, height, "EeDdl", 1000)
        .unwrap()
        .unwrap();

    assert_eq!(mask[5 * width + 5], 0, "isolated speckle must be erased");
    assert_eq!(result.total_labels, 1, "only the solid block should remain labelled");
}

/// S4: a privacy mask zeroes luma and neutralises chroma in masked columns.
#[test]
fn s4_privacy_mask_zeroes_and_neutralises() {
    let width = 8usize;
    let height = 8usize;
    let mut mask = vec![0u8; width * height];
    for y in 0..height {
        for x in 4..width {
            mask[y * width + x] = 255;
        }
    }
    let or_mask = privacy::build_or_mask(&mask);

    let mut luma = vec![0x66u8; width * height];
    let mut chroma = vec![0x20u8; (width / 2) * (height / 2)];

    privacy::apply_privacy_mask(&mut luma, &mut chroma, &mask, &or_mask, width);

    for y in 0..height {
        for x in 0..4 {
            assert_eq!(luma[y * width + x], 0);
        }
        for x in 4..width {
            assert_eq!(luma[y * width + x], 0x66);
        }
    }
    assert_eq!(chroma[0], 0x80);
}

/// S6: passthrough packet emission starts at the preceding key frame and
/// never re-emits an already-written packet.
#[test]
fn s6_passthrough_packet_emission_from_preceding_keyframe() {
    let mut ring = NetcamPacketRing::new();
    for i in 0..50u32 {
        let is_key = i % 8 == 0; // keys at 1, 9, 17, 25, 33, 41, 49
        ring.push(vec![0u8; 4], is_key, SystemTime::now(), i as i64 * 33, true);
    }

    let dumped = ring.dump(47);
    assert_eq!(dumped.first().unwrap().idnbr, 41);
    assert!(dumped.iter().all(|p| p.idnbr <= 47));

    let redumped = ring.dump(47);
    assert!(redumped.is_empty(), "already-written packets must not reappear");
}
