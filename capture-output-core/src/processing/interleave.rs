use crate::models::flags::MAX_AUDIO_MIXES;
use crate::models::packet::{Packet, PacketKind};

/// Merges packets from one video track and up to `MAX_AUDIO_MIXES` audio
/// tracks into a single stream ordered by `dts_usec`.
///
/// Not thread-safe on its own; the owning output wraps it in a
/// `parking_lot::Mutex` so insert and emit decisions are atomic.
///
/// Packets are held back until a packet of the opposite kind with a strictly
/// higher timestamp is buffered. Until that happens nothing proves that the
/// other encoder won't still deliver something earlier.
///
/// ```text
/// video: v0 ───────── v33 ───────── v66
/// audio: a0 ── a20 ── a40 ── a60 ── a80
///
/// out:   v0 a0 a20 v33 a40 a60 v66 ...
/// ```
#[derive(Debug)]
pub struct InterleaveBuffer {
    pending: Vec<Packet>,
    received_video: bool,
    received_audio: bool,
    video_offset: i64,
    audio_offsets: [i64; MAX_AUDIO_MIXES],
    highest_video_ts: i64,
    highest_audio_ts: i64,
    audio_mixes: usize,
}

impl InterleaveBuffer {
    pub fn new(audio_mixes: usize) -> Self {
        Self {
            pending: Vec::new(),
            received_video: false,
            received_audio: false,
            video_offset: 0,
            audio_offsets: [0; MAX_AUDIO_MIXES],
            highest_video_ts: 0,
            highest_audio_ts: 0,
            audio_mixes: audio_mixes.clamp(1, MAX_AUDIO_MIXES),
        }
    }

    /// Drop everything and start over for a new capture.
    pub fn reset(&mut self, audio_mixes: usize) {
        *self = Self::new(audio_mixes);
    }

    /// Whether first-pair offsets have been established.
    pub fn is_started(&self) -> bool {
        self.received_video && self.received_audio
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn video_offset(&self) -> i64 {
        self.video_offset
    }

    pub fn audio_offset(&self, track: usize) -> Option<i64> {
        self.audio_offsets.get(track).copied()
    }

    /// Feed one packet. Returns the packet that is now safe to send, if any.
    ///
    /// At most one packet leaves per call.
    pub fn interleave(&mut self, packet: Packet) -> Option<Packet> {
        let mut packet = packet;
        let was_started = self.is_started();

        if was_started {
            self.apply_offset(&mut packet);
        } else {
            self.check_received(&packet);
        }

        self.set_higher_ts(&packet);
        self.insert(packet);

        if !self.is_started() {
            return None;
        }

        if !was_started {
            self.prune();
            if !self.initialize() {
                return None;
            }
            self.resort();
        }

        self.pop_ready()
    }

    fn check_received(&mut self, packet: &Packet) {
        match packet.kind {
            PacketKind::Video => self.received_video = true,
            PacketKind::Audio => self.received_audio = true,
        }
    }

    fn offset_for(&self, packet: &Packet) -> i64 {
        match packet.kind {
            PacketKind::Video => self.video_offset,
            PacketKind::Audio => self.audio_offsets.get(packet.track_index).copied().unwrap_or(0),
        }
    }

    fn apply_offset(&self, packet: &mut Packet) {
        let offset = self.offset_for(packet);
        packet.offset_by(offset);
    }

    fn highest_ts(&self, kind: PacketKind) -> i64 {
        match kind {
            PacketKind::Video => self.highest_video_ts,
            PacketKind::Audio => self.highest_audio_ts,
        }
    }

    fn set_higher_ts(&mut self, packet: &Packet) {
        let ts = packet.dts_usec();
        match packet.kind {
            PacketKind::Video => self.highest_video_ts = self.highest_video_ts.max(ts),
            PacketKind::Audio => self.highest_audio_ts = self.highest_audio_ts.max(ts),
        }
    }

    fn has_higher_opposing_ts(&self, packet: &Packet) -> bool {
        self.highest_ts(packet.kind.opposite()) > packet.dts_usec()
    }

    /// Sorted insert by `dts_usec`; equal timestamps go after existing ones.
    fn insert(&mut self, packet: Packet) {
        let idx = self
            .pending
            .iter()
            .position(|cur| packet.dts_usec() < cur.dts_usec())
            .unwrap_or(self.pending.len());
        self.pending.insert(idx, packet);
    }

    fn resort(&mut self) {
        let old = std::mem::take(&mut self.pending);
        for packet in old {
            self.insert(packet);
        }
    }

    /// Audio nearly always arrives before the first video packet, so only
    /// leading audio is ever discarded. An audio packet survives when the
    /// packet right after it is video with the same timestamp.
    fn can_prune(&self, idx: usize) -> bool {
        if idx + 1 >= self.pending.len() {
            return false;
        }

        let packet = &self.pending[idx];
        if packet.kind != PacketKind::Audio {
            return false;
        }

        let next = &self.pending[idx + 1];
        !(next.kind == PacketKind::Video && next.dts_usec() == packet.dts_usec())
    }

    fn prune(&mut self) {
        let mut start = 0;
        while self.can_prune(start) {
            start += 1;
        }

        if start > 0 {
            log::debug!("pruned {} leading audio packet(s) before first video", start);
            self.pending.drain(..start);
        }
    }

    fn find_first(&self, kind: PacketKind, track: usize) -> Option<&Packet> {
        self.pending
            .iter()
            .find(|p| p.kind == kind && (kind == PacketKind::Video || p.track_index == track))
    }

    /// Establish per-track offsets from the first packet of every track.
    /// Returns `false` (and forgets the missing kind) when a track has not
    /// delivered anything yet.
    fn initialize(&mut self) -> bool {
        let video = self.find_first(PacketKind::Video, 0).map(|p| (p.dts(), p.dts_usec()));
        if video.is_none() {
            self.received_video = false;
        }

        let mut audio = [(0i64, 0i64); MAX_AUDIO_MIXES];
        for (track, slot) in audio.iter_mut().enumerate().take(self.audio_mixes) {
            match self.find_first(PacketKind::Audio, track) {
                Some(p) => *slot = (p.dts(), p.dts_usec()),
                None => {
                    self.received_audio = false;
                    return false;
                }
            }
        }

        let Some((video_dts, video_usec)) = video else {
            return false;
        };

        self.video_offset = video_dts;
        for track in 0..self.audio_mixes {
            self.audio_offsets[track] = audio[track].0;
        }

        self.highest_audio_ts -= audio[0].1;
        self.highest_video_ts -= video_usec;

        let offsets = (self.video_offset, self.audio_offsets);
        for packet in &mut self.pending {
            let offset = match packet.kind {
                PacketKind::Video => offsets.0,
                PacketKind::Audio => offsets.1.get(packet.track_index).copied().unwrap_or(0),
            };
            packet.offset_by(offset);
        }

        true
    }

    fn pop_ready(&mut self) -> Option<Packet> {
        let head = self.pending.first()?;
        if !self.has_higher_opposing_ts(head) {
            return None;
        }
        Some(self.pending.remove(0))
    }
}

impl Default for InterleaveBuffer {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::packet::TimeBase;
    use bytes::Bytes;

    fn v(ts: i64) -> Packet {
        Packet::video(ts, ts, TimeBase::MICROS, Bytes::new())
    }

    fn a(ts: i64) -> Packet {
        Packet::audio(ts, ts, TimeBase::MICROS, Bytes::new())
    }

    fn label(p: &Packet) -> String {
        let prefix = if p.is_video() { "v" } else { "a" };
        format!("{}{}", prefix, p.dts_usec() / 1000)
    }

    fn run(buf: &mut InterleaveBuffer, packets: Vec<Packet>) -> Vec<Packet> {
        packets.into_iter().filter_map(|p| buf.interleave(p)).collect()
    }

    #[test]
    fn waits_for_both_kinds() {
        let mut buf = InterleaveBuffer::new(1);

        assert!(buf.interleave(v(0)).is_none());
        assert!(buf.interleave(v(33_000)).is_none());
        assert!(!buf.is_started());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn scenario_emits_in_lookahead_order() {
        let mut buf = InterleaveBuffer::new(1);
        let out = run(
            &mut buf,
            vec![
                v(0),
                a(0),
                a(20_000),
                v(33_000),
                a(40_000),
                a(60_000),
                v(66_000),
                a(80_000),
                v(100_000),
            ],
        );

        let labels: Vec<_> = out.iter().map(label).collect();
        assert_eq!(labels, vec!["v0", "a0", "a20", "v33", "a40", "a60", "v66"]);
    }

    #[test]
    fn head_is_held_until_opposing_ts_is_higher() {
        let mut buf = InterleaveBuffer::new(1);

        assert!(buf.interleave(v(0)).is_none());
        // Equal timestamps are not enough to release v0.
        assert!(buf.interleave(a(0)).is_none());
        assert_eq!(buf.len(), 2);

        let out = buf.interleave(a(20_000)).unwrap();
        assert_eq!(label(&out), "v0");
    }

    #[test]
    fn emissions_are_monotonic_for_shuffled_arrival() {
        // Video at 30fps, audio at ~46.875 packets/s; the audio encoder runs
        // ahead by a few packets at a time.
        let video: Vec<i64> = (0..30).map(|i| i * 33_333).collect();
        let audio: Vec<i64> = (0..45).map(|i| i * 21_333).collect();

        let mut arrivals = Vec::new();
        let (mut vi, mut ai) = (0, 0);
        while vi < video.len() || ai < audio.len() {
            for _ in 0..3 {
                if ai < audio.len() {
                    arrivals.push(a(audio[ai]));
                    ai += 1;
                }
            }
            if vi < video.len() {
                arrivals.push(v(video[vi]));
                vi += 1;
            }
        }

        let mut buf = InterleaveBuffer::new(1);
        let out = run(&mut buf, arrivals);

        assert!(!out.is_empty());
        for pair in out.windows(2) {
            assert!(pair[0].dts_usec() <= pair[1].dts_usec(), "{} after {}", label(&pair[1]), label(&pair[0]));
        }
    }

    #[test]
    fn never_emits_without_lookahead() {
        let mut buf = InterleaveBuffer::new(1);
        let arrivals = vec![v(0), a(0), a(10_000), v(20_000), v(40_000), a(30_000), a(50_000), v(60_000)];

        let mut highest_video = i64::MIN;
        let mut highest_audio = i64::MIN;
        for packet in arrivals {
            match packet.kind {
                PacketKind::Video => highest_video = highest_video.max(packet.dts_usec()),
                PacketKind::Audio => highest_audio = highest_audio.max(packet.dts_usec()),
            }
            if let Some(out) = buf.interleave(packet) {
                let opposing = match out.kind {
                    PacketKind::Video => highest_audio,
                    PacketKind::Audio => highest_video,
                };
                assert!(opposing > out.dts_usec());
            }
        }
    }

    #[test]
    fn offsets_normalize_to_zero() {
        let mut buf = InterleaveBuffer::new(1);
        let out = run(
            &mut buf,
            vec![v(1_000_000), a(1_500_000), a(1_520_000), v(1_033_000), a(1_540_000)],
        );

        assert_eq!(buf.video_offset(), 1_000_000);
        assert_eq!(buf.audio_offset(0), Some(1_500_000));
        let labels: Vec<_> = out.iter().map(label).collect();
        assert_eq!(labels, vec!["v0", "a0", "a20"]);
    }

    #[test]
    fn replay_with_offsets_applied_is_identical() {
        let video: Vec<i64> = (0..10).map(|i| 10_000 + i * 33_000).collect();
        let audio: Vec<i64> = (0..16).map(|i| 12_000 + i * 21_000).collect();

        let mut arrivals = Vec::new();
        for i in 0..16 {
            if i < video.len() {
                arrivals.push(v(video[i]));
            }
            arrivals.push(a(audio[i]));
        }

        let mut first = InterleaveBuffer::new(1);
        let out_first = run(&mut first, arrivals.clone());
        let (voff, aoff) = (first.video_offset(), first.audio_offset(0).unwrap());

        let shifted: Vec<Packet> = arrivals
            .into_iter()
            .map(|mut p| {
                let off = if p.is_video() { voff } else { aoff };
                p.offset_by(off);
                p
            })
            .collect();

        let mut second = InterleaveBuffer::new(1);
        let out_second = run(&mut second, shifted);

        assert_eq!(second.video_offset(), 0);
        assert_eq!(out_first, out_second);
    }

    #[test]
    fn leading_audio_is_pruned() {
        let mut buf = InterleaveBuffer::new(1);

        assert!(buf.interleave(a(0)).is_none());
        assert!(buf.interleave(a(20_000)).is_none());
        // Both kinds seen: the two leading audio packets are dropped, which
        // leaves no audio, so the buffer is not yet started.
        assert!(buf.interleave(v(40_000)).is_none());
        assert!(!buf.is_started());
        assert_eq!(buf.len(), 1);

        assert!(buf.interleave(a(40_000)).is_none());
        assert!(buf.is_started());
        assert_eq!(buf.video_offset(), 40_000);
        assert_eq!(buf.audio_offset(0), Some(40_000));
    }

    #[test]
    fn audio_paired_with_video_is_kept() {
        let mut buf = InterleaveBuffer::new(1);

        assert!(buf.interleave(a(0)).is_none());
        assert!(buf.interleave(a(20_000)).is_none());
        // a20 is immediately followed by v20, so only a0 is pruned.
        assert!(buf.interleave(v(20_000)).is_none());
        assert!(buf.is_started());
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.audio_offset(0), Some(20_000));
    }

    #[test]
    fn multi_track_waits_for_every_track() {
        let mut buf = InterleaveBuffer::new(2);

        assert!(buf.interleave(v(0)).is_none());
        assert!(buf.interleave(a(0).with_track(0)).is_none());
        assert!(!buf.is_started());

        let out = buf.interleave(a(5_000).with_track(1));
        assert!(buf.is_started());
        assert_eq!(buf.audio_offset(0), Some(0));
        assert_eq!(buf.audio_offset(1), Some(5_000));
        assert_eq!(out.map(|p| label(&p)), Some("v0".to_string()));

        // Track 1's second packet lands at 20ms after normalization; both
        // zero-stamped audio packets stay queued until video moves past them.
        assert!(buf.interleave(a(25_000).with_track(1)).is_none());
        let out = buf.interleave(v(33_000)).unwrap();
        assert_eq!((label(&out), out.track_index), ("a0".to_string(), 0));
        let out = buf.interleave(a(20_000).with_track(0)).unwrap();
        assert_eq!((label(&out), out.track_index), ("a0".to_string(), 1));
    }

    #[test]
    fn reset_forgets_everything() {
        let mut buf = InterleaveBuffer::new(1);
        run(&mut buf, vec![v(100), a(100), a(200)]);

        buf.reset(1);
        assert!(buf.is_empty());
        assert!(!buf.is_started());
        assert_eq!(buf.video_offset(), 0);
    }
}
