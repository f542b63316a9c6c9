use super::error::StopCode;

/// Lifecycle signal emitted by an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEvent {
    /// Capture began from a fresh start.
    Start,
    /// Capture ended; terminal unless a reconnect follows.
    Stop { code: StopCode },
    /// A reconnect attempt is scheduled after `delay_sec` seconds.
    Reconnect { delay_sec: u64 },
    /// Capture began again after a reconnect.
    ReconnectSuccess,
}

impl OutputEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop { .. } => "stop",
            Self::Reconnect { .. } => "reconnect",
            Self::ReconnectSuccess => "reconnect_success",
        }
    }
}
