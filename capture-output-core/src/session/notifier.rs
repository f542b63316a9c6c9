use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::models::event::OutputEvent;
use crate::session::output::Output;
use crate::traits::output_delegate::OutputDelegate;

/// Handle returned by [`EventNotifier::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Observer list for one output's lifecycle events.
///
/// Delegates are snapshotted before dispatch, so a delegate may subscribe or
/// unsubscribe from inside its own callback.
#[derive(Default)]
pub struct EventNotifier {
    next_id: AtomicU64,
    delegates: RwLock<Vec<(SubscriptionId, Arc<dyn OutputDelegate>)>>,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, delegate: Arc<dyn OutputDelegate>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.delegates.write().push((id, delegate));
        id
    }

    /// Returns `false` if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut delegates = self.delegates.write();
        let before = delegates.len();
        delegates.retain(|(sub, _)| *sub != id);
        delegates.len() != before
    }

    pub fn len(&self) -> usize {
        self.delegates.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.delegates.read().is_empty()
    }

    pub(crate) fn emit(&self, output: &Output, event: OutputEvent) {
        let delegates: Vec<_> = self.delegates.read().iter().map(|(_, d)| Arc::clone(d)).collect();
        log::debug!("output '{}': signal {}", output.name(), event.name());
        for delegate in delegates {
            delegate.on_output_event(output, &event);
        }
    }
}
