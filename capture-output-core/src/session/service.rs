use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::models::id::OutputId;
use crate::session::output::Output;
use crate::traits::service_backend::ServiceBackend;

#[derive(Default)]
struct ServiceState {
    active: bool,
    owner: Option<(OutputId, Weak<Output>)>,
}

/// A service bound to at most one output at a time.
pub struct Service {
    backend: Box<dyn ServiceBackend>,
    state: Mutex<ServiceState>,
}

impl Service {
    pub fn new(backend: impl ServiceBackend + 'static) -> Arc<Self> {
        log::info!("service '{}' created", backend.name());
        Arc::new(Self {
            backend: Box::new(backend),
            state: Mutex::new(ServiceState::default()),
        })
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    pub fn supports_multitrack(&self) -> bool {
        self.backend.supports_multitrack()
    }

    /// The output this service is currently bound to, if it is still alive.
    pub fn output(&self) -> Option<Arc<Output>> {
        self.state.lock().owner.as_ref().and_then(|(_, weak)| weak.upgrade())
    }

    pub(crate) fn owner_id(&self) -> Option<OutputId> {
        self.state.lock().owner.as_ref().map(|(id, _)| *id)
    }

    pub(crate) fn set_owner(&self, owner: Option<(OutputId, Weak<Output>)>) {
        self.state.lock().owner = owner;
    }

    pub(crate) fn initialize(&self, output: &Arc<Output>) -> bool {
        self.backend.initialize(output)
    }

    pub(crate) fn activate(&self) {
        self.backend.activate();
        self.state.lock().active = true;
    }

    pub(crate) fn deactivate(&self, force: bool) {
        self.backend.deactivate(force);
        self.state.lock().active = false;
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name())
            .field("active", &self.is_active())
            .finish()
    }
}
