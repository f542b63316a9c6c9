use bitflags::bitflags;

/// Maximum number of audio tracks a multi-track output can carry.
pub const MAX_AUDIO_MIXES: usize = 4;

bitflags! {
    /// Capabilities a sink declares, and the subset a capture asks for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OutputFlags: u32 {
        const VIDEO = 1 << 0;
        const AUDIO = 1 << 1;
        const AV = Self::VIDEO.bits() | Self::AUDIO.bits();
        const ENCODED = 1 << 2;
        const SERVICE = 1 << 3;
        const MULTI_TRACK = 1 << 4;
    }
}

/// What a single `begin_capture` call wires up, resolved against the sink's
/// declared flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturePlan {
    pub encoded: bool,
    pub has_video: bool,
    pub has_audio: bool,
    pub has_service: bool,
}

impl CapturePlan {
    /// Empty `requested` means "everything the sink supports".
    pub fn resolve(declared: OutputFlags, requested: OutputFlags) -> Self {
        let flags = if requested.is_empty() {
            declared
        } else {
            requested & declared
        };

        Self {
            encoded: declared.contains(OutputFlags::ENCODED),
            has_video: flags.contains(OutputFlags::VIDEO),
            has_audio: flags.contains(OutputFlags::AUDIO),
            has_service: flags.contains(OutputFlags::SERVICE),
        }
    }

    /// Both kinds present means packets go through the interleave buffer.
    pub fn interleaved(&self) -> bool {
        self.encoded && self.has_video && self.has_audio
    }
}
