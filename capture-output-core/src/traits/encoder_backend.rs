use std::sync::Arc;

use crate::models::error::CaptureError;
use crate::models::packet::{Packet, PacketKind};

/// Callback invoked for every packet an encoder emits.
///
/// Fires on the encoder's own thread.
pub type PacketCallback = Arc<dyn Fn(&Packet) + Send + Sync + 'static>;

/// The codec side of an encoder.
///
/// Implementations own the actual compression; the engine only needs the
/// kind of stream produced and a one-time initialization hook. Produced
/// packets are pushed through [`crate::Encoder::emit`].
pub trait EncoderBackend: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> PacketKind;

    /// Prepare the codec. Called before each capture that is not already
    /// running on another output.
    fn initialize(&self) -> Result<(), CaptureError>;

    /// Native output width for video encoders.
    fn width(&self) -> u32 {
        0
    }

    /// Native output height for video encoders.
    fn height(&self) -> u32 {
        0
    }
}
