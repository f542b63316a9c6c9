use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::models::id::{EncoderId, OutputId};
use crate::models::packet::{Packet, PacketKind};
use crate::session::output::Output;
use crate::traits::encoder_backend::{EncoderBackend, PacketCallback};

thread_local! {
    static DISPATCHING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as running packet callbacks.
struct DispatchScope {
    outer: bool,
}

impl DispatchScope {
    fn enter() -> Self {
        Self {
            outer: DISPATCHING.replace(true),
        }
    }
}

impl Drop for DispatchScope {
    fn drop(&mut self) {
        DISPATCHING.set(self.outer);
    }
}

struct Subscriber {
    output: OutputId,
    live: Arc<AtomicBool>,
    callback: PacketCallback,
}

#[derive(Default)]
struct EncoderState {
    initialized: bool,
    subscribers: Vec<Subscriber>,
    outputs: Vec<(OutputId, Weak<Output>)>,
    paired: Option<Weak<Encoder>>,
    wait_for_video: bool,
    first_packet_sent: bool,
    scaled_size: Option<(u32, u32)>,
}

/// An encoder as seen by the outputs it feeds.
///
/// One encoder may feed several outputs. Outputs hold it strongly; it keeps
/// only weak references back, so dropping an output never leaks through
/// the encoder.
pub struct Encoder {
    id: EncoderId,
    kind: PacketKind,
    backend: Box<dyn EncoderBackend>,
    state: Mutex<EncoderState>,
    /// Held by `emit` for the whole delivery, and by `stop` to wait it out.
    dispatch: Mutex<()>,
}

impl Encoder {
    pub fn new(backend: impl EncoderBackend + 'static) -> Arc<Self> {
        let kind = backend.kind();
        log::info!("encoder '{}' ({:?}) created", backend.name(), kind);
        Arc::new(Self {
            id: EncoderId::new(),
            kind,
            backend: Box::new(backend),
            state: Mutex::new(EncoderState::default()),
            dispatch: Mutex::new(()),
        })
    }

    pub fn id(&self) -> EncoderId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    /// An encoder is active while at least one output is subscribed.
    pub fn is_active(&self) -> bool {
        !self.state.lock().subscribers.is_empty()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn is_paired(&self) -> bool {
        self.state.lock().paired.is_some()
    }

    /// Whether audio output is held back until the paired video encoder
    /// produces its first packet.
    pub fn waits_for_video(&self) -> bool {
        self.state.lock().wait_for_video
    }

    pub fn paired_encoder(&self) -> Option<Arc<Encoder>> {
        self.state.lock().paired.as_ref().and_then(Weak::upgrade)
    }

    /// Initialize the codec unless it is already initialized or running for
    /// another output.
    pub fn initialize(&self) -> Result<(), CaptureError> {
        {
            let state = self.state.lock();
            if state.initialized || !state.subscribers.is_empty() {
                return Ok(());
            }
        }

        self.backend.initialize().map_err(|e| match e {
            CaptureError::EncoderInitFailed { .. } => e,
            other => CaptureError::EncoderInitFailed {
                name: self.name().to_string(),
                reason: other.to_string(),
            },
        })?;

        self.state.lock().initialized = true;
        Ok(())
    }

    /// Request a scaled output size. Ignored while the encoder is running.
    pub fn set_scaled_size(&self, width: u32, height: u32) {
        let mut state = self.state.lock();
        if !state.subscribers.is_empty() {
            log::warn!(
                "encoder '{}': cannot set the scaled resolution while the encoder is active",
                self.name()
            );
            return;
        }
        state.scaled_size = Some((width, height));
    }

    pub fn width(&self) -> u32 {
        match self.state.lock().scaled_size {
            Some((w, _)) => w,
            None => self.backend.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self.state.lock().scaled_size {
            Some((_, h)) => h,
            None => self.backend.height(),
        }
    }

    /// Outputs this encoder is bound to that are still alive.
    pub fn outputs(&self) -> Vec<Arc<Output>> {
        self.state
            .lock()
            .outputs
            .iter()
            .filter_map(|(_, weak)| weak.upgrade())
            .collect()
    }

    pub(crate) fn add_output(&self, id: OutputId, output: Weak<Output>) {
        let mut state = self.state.lock();
        if !state.outputs.iter().any(|(existing, _)| *existing == id) {
            state.outputs.push((id, output));
        }
    }

    pub(crate) fn remove_output(&self, id: OutputId) {
        self.state.lock().outputs.retain(|(existing, _)| *existing != id);
    }

    /// Detach this encoder from every output that references it.
    pub fn release_outputs(&self) {
        let outputs = std::mem::take(&mut self.state.lock().outputs);
        for (_, weak) in outputs {
            if let Some(output) = weak.upgrade() {
                output.remove_encoder(self);
            }
        }
    }

    /// Mark `audio` to wait for `video`'s first packet.
    pub(crate) fn pair(video: &Arc<Encoder>, audio: &Arc<Encoder>) {
        {
            let mut state = audio.state.lock();
            state.wait_for_video = true;
            state.paired = Some(Arc::downgrade(video));
        }
        video.state.lock().paired = Some(Arc::downgrade(audio));
    }

    /// Subscribe an output's packet callback.
    pub(crate) fn start(&self, output: OutputId, callback: PacketCallback) {
        let mut state = self.state.lock();
        if state.subscribers.iter().any(|s| s.output == output) {
            return;
        }
        state.subscribers.push(Subscriber {
            output,
            live: Arc::new(AtomicBool::new(true)),
            callback,
        });
    }

    /// Unsubscribe an output.
    ///
    /// Waits for a delivery running on another thread, so the callback is not
    /// running when this returns. Called from inside a callback on this
    /// thread, it only keeps later callbacks from starting.
    pub(crate) fn stop(&self, output: OutputId) {
        let _dispatch = (!DISPATCHING.get()).then(|| self.dispatch.lock());

        let peer = {
            let mut state = self.state.lock();
            let Some(pos) = state.subscribers.iter().position(|s| s.output == output) else {
                return;
            };
            let sub = state.subscribers.remove(pos);
            sub.live.store(false, Ordering::SeqCst);

            if !state.subscribers.is_empty() {
                return;
            }

            state.initialized = false;
            state.first_packet_sent = false;
            state.wait_for_video = false;
            state.paired.take()
        };

        if let Some(peer) = peer.and_then(|p| p.upgrade()) {
            let mut peer_state = peer.state.lock();
            peer_state.paired = None;
            peer_state.wait_for_video = false;
        }
    }

    /// Deliver one packet produced by the codec to every subscribed output.
    ///
    /// Called from the encoder's own thread. Callbacks must not emit on the
    /// same encoder.
    pub fn emit(&self, packet: Packet) {
        if packet.kind != self.kind {
            log::warn!(
                "encoder '{}': dropping {:?} packet from a {:?} encoder",
                self.name(),
                packet.kind,
                self.kind
            );
            return;
        }

        let _dispatch = self.dispatch.lock();
        let _scope = DispatchScope::enter();

        let (subscribers, release) = {
            let mut state = self.state.lock();
            if state.wait_for_video {
                return;
            }

            let mut release = None;
            if !state.first_packet_sent {
                state.first_packet_sent = true;
                if self.kind == PacketKind::Video {
                    release = state.paired.as_ref().and_then(Weak::upgrade);
                }
            }

            let subscribers: Vec<_> = state
                .subscribers
                .iter()
                .map(|s| (Arc::clone(&s.live), Arc::clone(&s.callback)))
                .collect();
            (subscribers, release)
        };

        if let Some(audio) = release {
            audio.state.lock().wait_for_video = false;
        }

        for (live, callback) in subscribers {
            if live.load(Ordering::SeqCst) {
                callback(&packet);
            }
        }
    }
}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("kind", &self.kind)
            .finish()
    }
}
