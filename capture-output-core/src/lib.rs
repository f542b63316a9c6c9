//! # capture-output-core
//!
//! Output data-capture and interleaving engine.
//!
//! Binds encoders (or raw upstream feeds) to an output sink, merges audio
//! and video packets into one timestamp-ordered stream, drives the capture
//! lifecycle and reconnects with exponential backoff after a disconnect.
//! Sinks (file muxers, network transports) implement `OutputSink`; codecs
//! implement `EncoderBackend`.
//!
//! ## Architecture
//!
//! ```text
//! capture-output-core (this crate)
//! ├── traits/       ← OutputSink, EncoderBackend, ServiceBackend, VideoFeed/AudioFeed, OutputDelegate
//! ├── models/       ← Packet, CaptureError, StopCode, CaptureState, OutputFlags, OutputSettings, FrameStats
//! ├── processing/   ← InterleaveBuffer
//! └── session/      ← Output, Encoder, Service, TrackBinding, ReconnectController, CaptureContext
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::config::OutputSettings;
pub use models::error::{CaptureError, StopCode};
pub use models::event::OutputEvent;
pub use models::flags::{CapturePlan, OutputFlags, MAX_AUDIO_MIXES};
pub use models::id::{EncoderId, OutputId};
pub use models::media::{AudioConvertInfo, RawAudioData, RawVideoFrame, VideoScaleInfo};
pub use models::packet::{Packet, PacketKind, TimeBase};
pub use models::state::CaptureState;
pub use models::stats::FrameStats;
pub use processing::interleave::InterleaveBuffer;
pub use session::binding::TrackBinding;
pub use session::context::CaptureContext;
pub use session::encoder::Encoder;
pub use session::notifier::{EventNotifier, SubscriptionId};
pub use session::output::{Output, OutputBuilder, WeakOutput};
pub use session::reconnect::{EventTimer, ReconnectController, ReconnectDecision, ReconnectTimer, StopEvent, WaitOutcome};
pub use session::service::Service;
pub use traits::encoder_backend::{EncoderBackend, PacketCallback};
pub use traits::media_feed::{AudioFeed, RawAudioCallback, RawVideoCallback, VideoFeed};
pub use traits::output_delegate::OutputDelegate;
pub use traits::service_backend::ServiceBackend;
pub use traits::sink::OutputSink;
