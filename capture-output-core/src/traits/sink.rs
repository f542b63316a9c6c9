use std::sync::Arc;

use crate::models::config::OutputSettings;
use crate::models::flags::OutputFlags;
use crate::models::media::{RawAudioData, RawVideoFrame};
use crate::models::packet::Packet;
use crate::session::output::Output;

/// Destination of a capture: a file muxer or a network transport.
///
/// For encoded outputs, [`Output::start`] runs [`Output::initialize_encoders`]
/// before calling the sink's `start`, which then opens its target and calls
/// [`Output::begin_capture`], either inline or from its own connect thread.
/// `begin_capture` refuses to go active while a required encoder is not
/// initialized.
/// Its `stop` is expected to call [`Output::end_capture`]. On failure it calls
/// [`Output::signal_stop`] exactly once, never while holding a lock the engine
/// may need.
pub trait OutputSink: Send + Sync {
    /// Capabilities of this sink (video, audio, encoded, service, multi-track).
    fn flags(&self) -> OutputFlags;

    /// Begin delivering to the target. Returns `false` if it cannot start.
    ///
    /// Encoders are already initialized (and paired) when this is called.
    fn start(&self, output: &Arc<Output>) -> bool;

    /// Stop delivering and release the target.
    fn stop(&self);

    /// Receive one encoded packet, in final interleaved order.
    fn encoded_packet(&self, packet: &Packet);

    /// Receive one raw video frame (outputs without `ENCODED`).
    fn raw_video(&self, _frame: &RawVideoFrame) {}

    /// Receive one block of raw audio (outputs without `ENCODED`).
    fn raw_audio(&self, _data: &RawAudioData) {}

    /// Bytes written to the target so far.
    fn total_bytes(&self) -> u64 {
        0
    }

    /// Frames the sink had to drop (e.g. under network congestion).
    fn dropped_frames(&self) -> u32 {
        0
    }

    fn supports_pause(&self) -> bool {
        false
    }

    fn pause(&self) {}

    /// Called when new settings are applied to the output.
    fn update(&self, _settings: &OutputSettings) {}
}
