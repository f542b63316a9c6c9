use std::sync::Arc;

use crate::models::id::OutputId;
use crate::models::media::{AudioConvertInfo, RawAudioData, RawVideoFrame, VideoScaleInfo};

/// Callback for raw video frames.
pub type RawVideoCallback = Arc<dyn Fn(&RawVideoFrame) + Send + Sync + 'static>;

/// Callback for raw audio blocks.
pub type RawAudioCallback = Arc<dyn Fn(&RawAudioData) + Send + Sync + 'static>;

/// The upstream video pipeline: frame clock plus raw frame delivery.
pub trait VideoFeed: Send + Sync {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Frames produced since the pipeline started.
    fn total_frames(&self) -> u32;

    /// Frames the pipeline skipped because rendering lagged.
    fn skipped_frames(&self) -> u32;

    fn connect(&self, output: OutputId, conversion: Option<VideoScaleInfo>, callback: RawVideoCallback);

    fn disconnect(&self, output: OutputId);
}

/// The upstream audio pipeline, one stream per mixer.
pub trait AudioFeed: Send + Sync {
    fn connect(
        &self,
        mixer: usize,
        output: OutputId,
        conversion: Option<AudioConvertInfo>,
        callback: RawAudioCallback,
    );

    fn disconnect(&self, mixer: usize, output: OutputId);
}
