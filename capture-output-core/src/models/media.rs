use bytes::Bytes;

/// Scaling requested from the raw video feed.
///
/// A zero dimension means "use the output's own width/height".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoScaleInfo {
    pub width: u32,
    pub height: u32,
}

/// Resampling requested from the raw audio feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConvertInfo {
    pub samples_per_sec: u32,
    pub channels: u16,
}

/// One unencoded video frame from the upstream video feed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawVideoFrame {
    pub planes: Vec<Bytes>,
    pub linesize: Vec<u32>,
    pub timestamp: u64,
}

/// A block of unencoded audio from one mixer of the upstream audio feed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAudioData {
    pub planes: Vec<Bytes>,
    pub frames: u32,
    pub timestamp: u64,
}
