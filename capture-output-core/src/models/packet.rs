use bytes::Bytes;

const MICROSECOND_DEN: i128 = 1_000_000;

/// Kind of elementary stream a packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Video,
    Audio,
}

impl PacketKind {
    /// The kind a packet must be compared against for the look-ahead guard.
    pub fn opposite(self) -> Self {
        match self {
            Self::Video => Self::Audio,
            Self::Audio => Self::Video,
        }
    }
}

/// Rational timebase of packet timestamps (`num / den` seconds per tick).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// One tick per microsecond; handy when timestamps are already in usec.
    pub const MICROS: TimeBase = TimeBase::new(1, 1_000_000);

    /// Convert a timestamp in this timebase to microseconds.
    pub fn to_usec(&self, ts: i64) -> i64 {
        if self.den == 0 {
            return 0;
        }
        (ts as i128 * self.num as i128 * MICROSECOND_DEN / self.den as i128) as i64
    }
}

/// An encoded chunk of audio or video.
///
/// `dts` is read-only outside this module: `dts_usec` is derived from it and
/// the timebase and only [`Packet::offset_by`] moves both together. The payload is reference counted, so cloning a
/// packet never copies the encoded bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub kind: PacketKind,
    pub track_index: usize,
    dts: i64,
    pub pts: i64,
    pub timebase: TimeBase,
    pub data: Bytes,
    pub keyframe: bool,
    dts_usec: i64,
}

impl Packet {
    pub fn new(kind: PacketKind, dts: i64, pts: i64, timebase: TimeBase, data: Bytes) -> Self {
        Self {
            kind,
            track_index: 0,
            dts,
            pts,
            timebase,
            data,
            keyframe: false,
            dts_usec: timebase.to_usec(dts),
        }
    }

    pub fn video(dts: i64, pts: i64, timebase: TimeBase, data: Bytes) -> Self {
        Self::new(PacketKind::Video, dts, pts, timebase, data)
    }

    pub fn audio(dts: i64, pts: i64, timebase: TimeBase, data: Bytes) -> Self {
        Self::new(PacketKind::Audio, dts, pts, timebase, data)
    }

    pub fn with_track(mut self, track_index: usize) -> Self {
        self.track_index = track_index;
        self
    }

    pub fn with_keyframe(mut self, keyframe: bool) -> Self {
        self.keyframe = keyframe;
        self
    }

    /// Decode timestamp in `timebase` ticks.
    pub fn dts(&self) -> i64 {
        self.dts
    }

    /// Decode timestamp converted to microseconds.
    pub fn dts_usec(&self) -> i64 {
        self.dts_usec
    }

    pub fn is_video(&self) -> bool {
        self.kind == PacketKind::Video
    }

    pub fn is_audio(&self) -> bool {
        self.kind == PacketKind::Audio
    }

    /// Subtract `offset` ticks from both timestamps and recompute `dts_usec`.
    pub fn offset_by(&mut self, offset: i64) {
        self.dts -= offset;
        self.pts -= offset;
        self.dts_usec = self.timebase.to_usec(self.dts);
    }
}
