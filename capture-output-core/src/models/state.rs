/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → starting → active → stopping → idle
///            ↓
///          idle (sink failed to start)
/// ```
///
/// Reconnection is tracked separately: an output waiting to reconnect is
/// `Idle` here but still reports itself as active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
}

impl CaptureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether the encoder callbacks may be (re)hooked from this state.
    pub fn can_begin(&self) -> bool {
        matches!(self, Self::Idle | Self::Starting)
    }
}
