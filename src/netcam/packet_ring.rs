//! Bounded ring of coded packets used for passthrough recording. Kept
//! entirely separate from the image [`RingBuffer`](crate::ring::RingBuffer)
//! and locked independently, since the netcam handler and the encoder touch
//! this ring from different threads while the image ring is only ever
//! touched by the camera thread itself.

use std::time::SystemTime;

#[derive(Debug, Clone)]
pub struct Packet {
    pub data: Vec<u8>,
    pub idnbr: i64,
    pub iskey: bool,
    pub iswritten: bool,
    pub timestamp: SystemTime,
    pub pts: i64,
    pub is_video: bool,
}

const MIN_RING_SIZE: usize = 30;

pub struct NetcamPacketRing {
    packets: Vec<Packet>,
    next_idnbr: i64,
}

impl NetcamPacketRing {
    pub fn new() -> Self {
        NetcamPacketRing {
            packets: Vec::with_capacity(MIN_RING_SIZE),
            next_idnbr: 1,
        }
    }

    /// Appends a newly received packet, assigning it the next monotonic id,
    /// then evicts fully-written packets once the ring has grown well past
    /// its required size.
    pub fn push(&mut self, data: Vec<u8>, iskey: bool, timestamp: SystemTime, pts: i64, is_video: bool) -> i64 {
        let idnbr = self.next_idnbr;
        self.next_idnbr += 1;
        self.packets.push(Packet {
            data,
            idnbr,
            iskey,
            iswritten: false,
            timestamp,
            pts,
            is_video,
        });
        self.trim_if_oversized();
        idnbr
    }

    pub fn mark_written(&mut self, idnbr: i64) {
        if let Some(p) = self.packets.iter_mut().find(|p| p.idnbr == idnbr) {
            p.iswritten = true;
        }
    }

    /// Required ring size given the current unwritten span: grow-only,
    /// clamped to >= 30.
    pub fn required_size(&self) -> usize {
        let oldest_written = self.oldest_written_id().unwrap_or(self.next_idnbr - 1);
        let first_unwritten = self.first_unwritten_id().unwrap_or(self.next_idnbr - 1);
        let current_id = self.next_idnbr - 1;
        let computed =
            2 * (first_unwritten - oldest_written) + 2 * (current_id - oldest_written);
        computed.max(MIN_RING_SIZE as i64) as usize
    }

    fn oldest_written_id(&self) -> Option<i64> {
        self.packets
            .iter()
            .filter(|p| p.iswritten)
            .map(|p| p.idnbr)
            .min()
    }

    fn first_unwritten_id(&self) -> Option<i64> {
        self.packets
            .iter()
            .filter(|p| !p.iswritten)
            .map(|p| p.idnbr)
            .min()
    }

    /// Drops fully-written packets from the front once the live ring
    /// exceeds `required_size()` by a comfortable margin; never drops an
    /// unwritten packet.
    fn trim_if_oversized(&mut self) {
        let target = self.required_size();
        while self.packets.len() > target.max(MIN_RING_SIZE) {
            if self.packets.first().map(|p| p.iswritten).unwrap_or(false) {
                self.packets.remove(0);
            } else {
                break;
            }
        }
    }

    /// Finds the index of the most recent key frame with id <= `up_to_id`,
    /// the starting point for a passthrough dump.
    pub fn last_key_frame_at_or_before(&self, up_to_id: i64) -> Option<usize> {
        self.packets
            .iter()
            .enumerate()
            .filter(|(_, p)| p.iskey && p.idnbr <= up_to_id)
            .max_by_key(|(_, p)| p.idnbr)
            .map(|(i, _)| i)
    }

    /// Minimum PTS across all packets on `stream` (video or audio), used to
    /// rewrite PTS/DTS to a stream-relative base before writing.
    pub fn min_pts(&self, is_video: bool) -> Option<i64> {
        self.packets
            .iter()
            .filter(|p| p.is_video == is_video)
            .map(|p| p.pts)
            .min()
    }

    /// Collects the ordered, unwritten packets from `start_idx` up to and
    /// including `up_to_id`, marking each written as it is returned. This
    /// is the passthrough "dump" algorithm: starting at the nearest
    /// preceding key frame, emit every unwritten packet through the
    /// requested point.
    pub fn dump(&mut self, up_to_id: i64) -> Vec<Packet> {
        let start = match self.last_key_frame_at_or_before(up_to_id) {
            Some(idx) => idx,
            None => return Vec::new(),
        };
        let min_video_pts = self.min_pts(true).unwrap_or(0);
        let min_audio_pts = self.min_pts(false).unwrap_or(0);

        let mut out = Vec::new();
        for packet in &mut self.packets[start..] {
            if packet.idnbr > up_to_id {
                break;
            }
            if packet.iswritten {
                continue;
            }
            let base = if packet.is_video { min_video_pts } else { min_audio_pts };
            let mut emitted = packet.clone();
            emitted.pts -= base;
            packet.iswritten = true;
            out.push(emitted);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

impl Default for NetcamPacketRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_n(ring: &mut NetcamPacketRing, n: usize, key_every: usize) {
        for i in 0..n {
            ring.push(vec![0u8; 4], i % key_every == 0, SystemTime::now(), i as i64 * 33, true);
        }
    }

    #[test]
    fn dump_starts_at_preceding_key_frame() {
        let mut ring = NetcamPacketRing::new();
        push_n(&mut ring, 50, 8); // keys at ids 1, 9, 17, 25, 33, 41, 49
        let dumped = ring.dump(47);
        // last key <= 47 is id 41
        assert_eq!(dumped.first().unwrap().idnbr, 41);
        assert_eq!(dumped.last().unwrap().idnbr, 47);
        assert!(dumped.iter().all(|p| p.idnbr <= 47));
    }

    #[test]
    fn dump_does_not_rewrite_already_written_packets() {
        let mut ring = NetcamPacketRing::new();
        push_n(&mut ring, 20, 5);
        let first = ring.dump(10);
        assert!(!first.is_empty());
        let second = ring.dump(10);
        assert!(second.is_empty(), "already-written packets must not reappear");
    }

    #[test]
    fn required_size_is_clamped_to_minimum() {
        let mut ring = NetcamPacketRing::new();
        push_n(&mut ring, 3, 1);
        assert!(ring.required_size() >= MIN_RING_SIZE);
    }
}
