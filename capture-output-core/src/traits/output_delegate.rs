use crate::models::event::OutputEvent;
use crate::session::output::Output;

/// Observer for output lifecycle events.
///
/// Called from whichever thread caused the transition (caller, sink thread,
/// or the reconnect worker). Implementations should marshal elsewhere if they
/// need to do real work.
pub trait OutputDelegate: Send + Sync {
    fn on_output_event(&self, output: &Output, event: &OutputEvent);
}

impl<F> OutputDelegate for F
where
    F: Fn(&Output, &OutputEvent) + Send + Sync,
{
    fn on_output_event(&self, output: &Output, event: &OutputEvent) {
        self(output, event)
    }
}
