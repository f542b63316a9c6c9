use std::sync::Arc;

use crate::session::output::Output;

/// A streaming service an output publishes to (server URL, credentials, ...).
pub trait ServiceBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Prepare the service for `output`. Returns `false` on failure.
    fn initialize(&self, output: &Arc<Output>) -> bool;

    fn activate(&self) {}

    fn deactivate(&self, _force: bool) {}

    /// Whether the service accepts more than one audio track.
    fn supports_multitrack(&self) -> bool {
        false
    }
}
