//! Mock collaborators shared by the session tests.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::models::config::OutputSettings;
use crate::models::error::CaptureError;
use crate::models::event::OutputEvent;
use crate::models::flags::OutputFlags;
use crate::models::id::OutputId;
use crate::models::media::{AudioConvertInfo, RawAudioData, RawVideoFrame, VideoScaleInfo};
use crate::models::packet::{Packet, PacketKind};
use crate::session::output::Output;
use crate::session::reconnect::{ReconnectTimer, StopEvent, WaitOutcome};
use crate::traits::encoder_backend::EncoderBackend;
use crate::traits::media_feed::{AudioFeed, RawAudioCallback, RawVideoCallback, VideoFeed};
use crate::traits::service_backend::ServiceBackend;
use crate::traits::sink::OutputSink;

pub struct MockEncoder {
    name: String,
    kind: PacketKind,
    fail: bool,
    size: (u32, u32),
    pub init_count: Arc<AtomicUsize>,
}

impl MockEncoder {
    pub fn video(name: &str) -> Self {
        Self::new(name, PacketKind::Video)
    }

    pub fn audio(name: &str) -> Self {
        Self::new(name, PacketKind::Audio)
    }

    fn new(name: &str, kind: PacketKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            fail: false,
            size: (0, 0),
            init_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = (width, height);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl EncoderBackend for MockEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PacketKind {
        self.kind
    }

    fn initialize(&self) -> Result<(), CaptureError> {
        self.init_count.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CaptureError::EncoderInitFailed {
                name: self.name.clone(),
                reason: "codec unavailable".into(),
            });
        }
        Ok(())
    }

    fn width(&self) -> u32 {
        self.size.0
    }

    fn height(&self) -> u32 {
        self.size.1
    }
}

/// How [`MockSink::start`] behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartBehavior {
    /// Call `begin_capture` inline and report success.
    Begin,
    /// Report failure without signaling.
    Refuse,
}

pub struct MockSink {
    flags: OutputFlags,
    behavior: Mutex<StartBehavior>,
    output: Mutex<Option<Weak<Output>>>,
    pub start_count: AtomicUsize,
    pub stop_count: AtomicUsize,
    pub packets: Mutex<Vec<Packet>>,
    pub raw_video: Mutex<Vec<RawVideoFrame>>,
    pub raw_audio: Mutex<Vec<RawAudioData>>,
    pub updates: Mutex<Vec<OutputSettings>>,
    pub dropped: AtomicU32,
}

impl MockSink {
    pub fn new(flags: OutputFlags) -> Arc<Self> {
        Arc::new(Self {
            flags,
            behavior: Mutex::new(StartBehavior::Begin),
            output: Mutex::new(None),
            start_count: AtomicUsize::new(0),
            stop_count: AtomicUsize::new(0),
            packets: Mutex::new(Vec::new()),
            raw_video: Mutex::new(Vec::new()),
            raw_audio: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            dropped: AtomicU32::new(0),
        })
    }

    pub fn encoded_av() -> Arc<Self> {
        Self::new(OutputFlags::AV | OutputFlags::ENCODED)
    }

    pub fn set_behavior(&self, behavior: StartBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn starts(&self) -> usize {
        self.start_count.load(Ordering::SeqCst)
    }

    pub fn labels(&self) -> Vec<String> {
        self.packets
            .lock()
            .iter()
            .map(|p| {
                let prefix = if p.is_video() { "v" } else { "a" };
                format!("{}{}", prefix, p.dts_usec() / 1000)
            })
            .collect()
    }
}

impl OutputSink for MockSink {
    fn flags(&self) -> OutputFlags {
        self.flags
    }

    fn start(&self, output: &Arc<Output>) -> bool {
        self.start_count.fetch_add(1, Ordering::SeqCst);
        *self.output.lock() = Some(Arc::downgrade(output));

        let behavior = *self.behavior.lock();
        match behavior {
            StartBehavior::Begin => output.begin_capture(OutputFlags::empty()).is_ok(),
            StartBehavior::Refuse => false,
        }
    }

    fn stop(&self) {
        self.stop_count.fetch_add(1, Ordering::SeqCst);
        let output = self.output.lock().as_ref().and_then(Weak::upgrade);
        if let Some(output) = output {
            output.end_capture();
        }
    }

    fn encoded_packet(&self, packet: &Packet) {
        self.packets.lock().push(packet.clone());
    }

    fn raw_video(&self, frame: &RawVideoFrame) {
        self.raw_video.lock().push(frame.clone());
    }

    fn raw_audio(&self, data: &RawAudioData) {
        self.raw_audio.lock().push(data.clone());
    }

    fn total_bytes(&self) -> u64 {
        self.packets.lock().iter().map(|p| p.data.len() as u64).sum()
    }

    fn dropped_frames(&self) -> u32 {
        self.dropped.load(Ordering::SeqCst)
    }

    fn supports_pause(&self) -> bool {
        true
    }

    fn update(&self, settings: &OutputSettings) {
        self.updates.lock().push(settings.clone());
    }
}

pub struct MockService {
    name: String,
    multitrack: bool,
    init_ok: bool,
    pub activations: Arc<AtomicUsize>,
    pub deactivations: Arc<AtomicUsize>,
}

impl MockService {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            multitrack: false,
            init_ok: true,
            activations: Arc::new(AtomicUsize::new(0)),
            deactivations: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn multitrack(mut self) -> Self {
        self.multitrack = true;
        self
    }

    pub fn failing(mut self) -> Self {
        self.init_ok = false;
        self
    }
}

impl ServiceBackend for MockService {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self, _output: &Arc<Output>) -> bool {
        self.init_ok
    }

    fn activate(&self) {
        self.activations.fetch_add(1, Ordering::SeqCst);
    }

    fn deactivate(&self, _force: bool) {
        self.deactivations.fetch_add(1, Ordering::SeqCst);
    }

    fn supports_multitrack(&self) -> bool {
        self.multitrack
    }
}

#[derive(Default)]
pub struct MockVideoFeed {
    pub width: u32,
    pub height: u32,
    pub total: AtomicU32,
    pub skipped: AtomicU32,
    pub connections: Mutex<Vec<(OutputId, Option<VideoScaleInfo>, RawVideoCallback)>>,
}

impl MockVideoFeed {
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            width,
            height,
            ..Default::default()
        })
    }

    /// Advance the frame clock and deliver a frame to every connection.
    pub fn push_frame(&self, timestamp: u64) {
        self.total.fetch_add(1, Ordering::SeqCst);
        let frame = RawVideoFrame {
            planes: Vec::new(),
            linesize: Vec::new(),
            timestamp,
        };
        let callbacks: Vec<_> = self.connections.lock().iter().map(|(_, _, cb)| Arc::clone(cb)).collect();
        for cb in callbacks {
            cb(&frame);
        }
    }
}

impl VideoFeed for MockVideoFeed {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn total_frames(&self) -> u32 {
        self.total.load(Ordering::SeqCst)
    }

    fn skipped_frames(&self) -> u32 {
        self.skipped.load(Ordering::SeqCst)
    }

    fn connect(&self, output: OutputId, conversion: Option<VideoScaleInfo>, callback: RawVideoCallback) {
        self.connections.lock().push((output, conversion, callback));
    }

    fn disconnect(&self, output: OutputId) {
        self.connections.lock().retain(|(id, _, _)| *id != output);
    }
}

#[derive(Default)]
pub struct MockAudioFeed {
    pub connections: Mutex<Vec<(usize, OutputId, RawAudioCallback)>>,
}

impl MockAudioFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, mixer: usize, frames: u32) {
        let data = RawAudioData {
            planes: Vec::new(),
            frames,
            timestamp: 0,
        };
        let callbacks: Vec<_> = self
            .connections
            .lock()
            .iter()
            .filter(|(m, _, _)| *m == mixer)
            .map(|(_, _, cb)| Arc::clone(cb))
            .collect();
        for cb in callbacks {
            cb(&data);
        }
    }
}

impl AudioFeed for MockAudioFeed {
    fn connect(
        &self,
        mixer: usize,
        output: OutputId,
        _conversion: Option<AudioConvertInfo>,
        callback: RawAudioCallback,
    ) {
        self.connections.lock().push((mixer, output, callback));
    }

    fn disconnect(&self, mixer: usize, output: OutputId) {
        self.connections.lock().retain(|(m, id, _)| !(*m == mixer && *id == output));
    }
}

/// Returns immediately and records every requested delay.
#[derive(Default)]
pub struct InstantTimer {
    pub delays: Mutex<Vec<Duration>>,
}

impl ReconnectTimer for InstantTimer {
    fn wait(&self, delay: Duration, stop: &StopEvent) -> WaitOutcome {
        self.delays.lock().push(delay);
        if stop.is_signaled() {
            WaitOutcome::Cancelled
        } else {
            WaitOutcome::Elapsed
        }
    }
}

/// Subscribe a channel to `output`'s events.
pub fn event_channel(output: &Output) -> Receiver<OutputEvent> {
    let (tx, rx): (Sender<OutputEvent>, Receiver<OutputEvent>) = crossbeam_channel::unbounded();
    output.subscribe(Arc::new(move |_: &Output, event: &OutputEvent| {
        let _ = tx.send(*event);
    }));
    rx
}

/// Pull events until `pred` matches or the timeout expires.
pub fn wait_for(rx: &Receiver<OutputEvent>, timeout: Duration, pred: impl Fn(&OutputEvent) -> bool) -> Vec<OutputEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = rx.recv_timeout(timeout) {
        let done = pred(&event);
        seen.push(event);
        if done {
            break;
        }
    }
    seen
}
