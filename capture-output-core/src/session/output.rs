use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::config::OutputSettings;
use crate::models::error::{CaptureError, StopCode};
use crate::models::event::OutputEvent;
use crate::models::flags::{CapturePlan, OutputFlags, MAX_AUDIO_MIXES};
use crate::models::id::OutputId;
use crate::models::media::{AudioConvertInfo, RawAudioData, RawVideoFrame, VideoScaleInfo};
use crate::models::packet::Packet;
use crate::models::state::CaptureState;
use crate::models::stats::FrameStats;
use crate::processing::interleave::InterleaveBuffer;
use crate::session::binding::TrackBinding;
use crate::session::encoder::Encoder;
use crate::session::notifier::{EventNotifier, SubscriptionId};
use crate::session::reconnect::{
    EventTimer, ReconnectController, ReconnectDecision, ReconnectTimer, StopEvent, WaitOutcome,
};
use crate::session::service::Service;
use crate::traits::encoder_backend::PacketCallback;
use crate::traits::media_feed::{AudioFeed, RawAudioCallback, RawVideoCallback, VideoFeed};
use crate::traits::output_delegate::OutputDelegate;
use crate::traits::sink::OutputSink;

/// Mutable session state, protected by `parking_lot::Mutex`.
struct SessionState {
    state: CaptureState,
    binding: TrackBinding,
    service: Option<Arc<Service>>,
    video: Option<Arc<dyn VideoFeed>>,
    audio: Option<Arc<dyn AudioFeed>>,
    mixer: usize,
    scaled_size: Option<(u32, u32)>,
    video_conversion: Option<VideoScaleInfo>,
    audio_conversion: Option<AudioConvertInfo>,
    settings: OutputSettings,
    starting_frame_count: u32,
    starting_skipped_frame_count: u32,
    started_at: Option<DateTime<Utc>>,
}

/// Builder for [`Output`].
pub struct OutputBuilder {
    name: String,
    sink: Arc<dyn OutputSink>,
    video: Option<Arc<dyn VideoFeed>>,
    audio: Option<Arc<dyn AudioFeed>>,
    timer: Arc<dyn ReconnectTimer>,
    settings: Option<OutputSettings>,
}

impl OutputBuilder {
    pub fn new(name: impl Into<String>, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            name: name.into(),
            sink,
            video: None,
            audio: None,
            timer: Arc::new(EventTimer),
            settings: None,
        }
    }

    pub fn video_feed(mut self, feed: Arc<dyn VideoFeed>) -> Self {
        self.video = Some(feed);
        self
    }

    pub fn audio_feed(mut self, feed: Arc<dyn AudioFeed>) -> Self {
        self.audio = Some(feed);
        self
    }

    /// Replace the real-time reconnect timer.
    pub fn reconnect_timer(mut self, timer: Arc<dyn ReconnectTimer>) -> Self {
        self.timer = timer;
        self
    }

    pub fn settings(mut self, settings: OutputSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn build(self) -> Result<Arc<Output>, CaptureError> {
        let settings = self.settings.unwrap_or_default();
        settings.validate().map_err(CaptureError::InvalidSettings)?;

        let flags = self.sink.flags();
        let reconnect = ReconnectController::new(settings.effective_max_retries(), settings.retry_delay);
        let mixer = settings.mixer_index();

        let output = Arc::new_cyclic(|weak_self| Output {
            id: OutputId::new(),
            name: self.name,
            flags,
            sink: self.sink,
            weak_self: weak_self.clone(),
            notifier: EventNotifier::new(),
            session: Mutex::new(SessionState {
                state: CaptureState::Idle,
                binding: TrackBinding::new(),
                service: None,
                video: self.video,
                audio: self.audio,
                mixer,
                scaled_size: None,
                video_conversion: None,
                audio_conversion: None,
                settings,
                starting_frame_count: 0,
                starting_skipped_frame_count: 0,
                started_at: None,
            }),
            interleave: Mutex::new(InterleaveBuffer::default()),
            capturing: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            total_frames: AtomicU32::new(0),
            reconnect: Mutex::new(reconnect),
            reconnect_stop: Arc::new(StopEvent::new()),
            reconnect_worker: Mutex::new(None),
            timer: self.timer,
        });

        log::info!("output '{}' ({}) created", output.name, output.id);
        Ok(output)
    }
}

/// One capture session: binds encoders or raw feeds to a sink, orders
/// packets, tracks the lifecycle and reconnects after disconnects.
///
/// Data flow for an encoded audio/video output:
/// ```text
/// [Video Encoder] ─┐
///                  ├→ [InterleaveBuffer] → [OutputSink]
/// [Audio Encoder] ─┘
/// ```
///
/// Lock order: `interleave` before `session`. `reconnect` is never held
/// while taking either. Encoder dispatch is never awaited with `session`
/// held.
pub struct Output {
    id: OutputId,
    name: String,
    flags: OutputFlags,
    sink: Arc<dyn OutputSink>,
    weak_self: Weak<Output>,
    notifier: EventNotifier,
    session: Mutex<SessionState>,
    interleave: Mutex<InterleaveBuffer>,
    capturing: AtomicBool,
    stopped: AtomicBool,
    total_frames: AtomicU32,
    reconnect: Mutex<ReconnectController>,
    reconnect_stop: Arc<StopEvent>,
    reconnect_worker: Mutex<Option<JoinHandle<()>>>,
    timer: Arc<dyn ReconnectTimer>,
}

/// Non-owning handle to an [`Output`].
#[derive(Debug, Clone)]
pub struct WeakOutput(Weak<Output>);

impl WeakOutput {
    /// Strong handle, or `None` once the output is gone.
    pub fn upgrade(&self) -> Option<Arc<Output>> {
        self.0.upgrade()
    }

    pub fn references(&self, output: &Output) -> bool {
        std::ptr::eq(self.0.as_ptr(), output)
    }
}

impl Output {
    pub fn id(&self) -> OutputId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> OutputFlags {
        self.flags
    }

    pub fn downgrade(&self) -> WeakOutput {
        WeakOutput(self.weak_self.clone())
    }

    pub fn subscribe(&self, delegate: Arc<dyn OutputDelegate>) -> SubscriptionId {
        self.notifier.subscribe(delegate)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    pub fn state(&self) -> CaptureState {
        self.session.lock().state
    }

    /// Capturing, or waiting to reconnect.
    pub fn is_active(&self) -> bool {
        self.state().is_active() || self.is_reconnecting()
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnect.lock().is_reconnecting()
    }

    fn ensure_inactive(&self, session: &SessionState) -> Result<(), CaptureError> {
        if !session.state.is_idle() || self.is_reconnecting() {
            return Err(CaptureError::OutputActive);
        }
        Ok(())
    }

    fn is_multi_track(&self) -> bool {
        self.flags.contains(OutputFlags::MULTI_TRACK)
    }

    // -- Encoder binding --

    /// Bind (or with `None`, unbind) the video encoder.
    pub fn set_video_encoder(&self, encoder: Option<Arc<Encoder>>) -> Result<(), CaptureError> {
        let mut session = self.session.lock();
        self.ensure_inactive(&session)?;

        let previous = session.binding.set_video(encoder.clone())?;
        self.detach_if_unbound(&session.binding, previous);

        if let Some(enc) = &encoder {
            enc.add_output(self.id, self.weak_self.clone());
            if let Some((w, h)) = session.scaled_size {
                enc.set_scaled_size(w, h);
            }
        }
        Ok(())
    }

    /// Bind (or with `None`, unbind) the audio encoder for `track`.
    pub fn set_audio_encoder(&self, encoder: Option<Arc<Encoder>>, track: usize) -> Result<(), CaptureError> {
        let mut session = self.session.lock();
        self.ensure_inactive(&session)?;

        let previous = session.binding.set_audio(encoder.clone(), track, self.is_multi_track())?;
        self.detach_if_unbound(&session.binding, previous);

        if let Some(enc) = &encoder {
            enc.add_output(self.id, self.weak_self.clone());
        }
        Ok(())
    }

    fn detach_if_unbound(&self, binding: &TrackBinding, previous: Option<Arc<Encoder>>) {
        if let Some(prev) = previous {
            if !binding.encoders().any(|e| Arc::ptr_eq(e, &prev)) {
                prev.remove_output(self.id);
            }
        }
    }

    pub fn video_encoder(&self) -> Option<Arc<Encoder>> {
        self.session.lock().binding.video().cloned()
    }

    pub fn audio_encoder(&self, track: usize) -> Option<Arc<Encoder>> {
        self.session.lock().binding.audio(track, self.is_multi_track()).cloned()
    }

    /// Drop every binding to `encoder`. Called when the encoder releases
    /// its outputs.
    pub(crate) fn remove_encoder(&self, encoder: &Encoder) {
        if self.session.lock().binding.remove(encoder.id()) {
            log::debug!("output '{}': encoder '{}' removed", self.name, encoder.name());
        }
    }

    // -- Service --

    /// Bind `service`, taking it from whichever output held it before.
    pub fn set_service(&self, service: Arc<Service>) -> Result<(), CaptureError> {
        self.ensure_inactive(&self.session.lock())?;
        if service.is_active() {
            return Err(CaptureError::ServiceActive);
        }

        if let Some(owner) = service.output() {
            if owner.id != self.id {
                owner.clear_service(&service);
            }
        }

        let old = self.session.lock().service.replace(Arc::clone(&service));
        if let Some(old) = old {
            if !Arc::ptr_eq(&old, &service) && old.owner_id() == Some(self.id) {
                old.set_owner(None);
            }
        }

        service.set_owner(Some((self.id, self.weak_self.clone())));
        Ok(())
    }

    fn clear_service(&self, service: &Arc<Service>) {
        let mut session = self.session.lock();
        if session.service.as_ref().is_some_and(|s| Arc::ptr_eq(s, service)) {
            session.service = None;
        }
    }

    pub fn service(&self) -> Option<Arc<Service>> {
        self.session.lock().service.clone()
    }

    // -- Raw media and sizing --

    /// Attach the upstream raw feeds used by outputs without `ENCODED`.
    pub fn set_media(
        &self,
        video: Option<Arc<dyn VideoFeed>>,
        audio: Option<Arc<dyn AudioFeed>>,
    ) -> Result<(), CaptureError> {
        let mut session = self.session.lock();
        self.ensure_inactive(&session)?;
        session.video = video;
        session.audio = audio;
        Ok(())
    }

    /// Select the audio mixer used by raw capture.
    pub fn set_mixer(&self, mixer: usize) -> Result<(), CaptureError> {
        if mixer >= MAX_AUDIO_MIXES {
            return Err(CaptureError::TrackOutOfRange(mixer));
        }
        let mut session = self.session.lock();
        self.ensure_inactive(&session)?;
        session.mixer = mixer;
        Ok(())
    }

    pub fn mixer(&self) -> usize {
        self.session.lock().mixer
    }

    pub fn set_video_conversion(&self, conversion: VideoScaleInfo) {
        self.session.lock().video_conversion = Some(conversion);
    }

    pub fn set_audio_conversion(&self, conversion: AudioConvertInfo) {
        self.session.lock().audio_conversion = Some(conversion);
    }

    /// Request a scaled resolution for the video this output receives.
    pub fn set_preferred_size(&self, width: u32, height: u32) -> Result<(), CaptureError> {
        if !self.flags.contains(OutputFlags::VIDEO) {
            return Err(CaptureError::Unsupported("video"));
        }

        let mut session = self.session.lock();
        if let Err(e) = self.ensure_inactive(&session) {
            log::warn!(
                "output '{}': cannot set the preferred resolution while the output is active",
                self.name
            );
            return Err(e);
        }

        session.scaled_size = Some((width, height));
        if self.flags.contains(OutputFlags::ENCODED) {
            if let Some(video) = session.binding.video() {
                video.set_scaled_size(width, height);
            }
        }
        Ok(())
    }

    pub fn width(&self) -> u32 {
        let session = self.session.lock();
        self.dimensions(&session).0
    }

    pub fn height(&self) -> u32 {
        let session = self.session.lock();
        self.dimensions(&session).1
    }

    fn dimensions(&self, session: &SessionState) -> (u32, u32) {
        if !self.flags.contains(OutputFlags::VIDEO) {
            return (0, 0);
        }
        if self.flags.contains(OutputFlags::ENCODED) {
            return session.binding.video().map_or((0, 0), |v| (v.width(), v.height()));
        }
        if let Some(size) = session.scaled_size {
            return size;
        }
        session.video.as_ref().map_or((0, 0), |v| (v.width(), v.height()))
    }

    /// Scaling the raw video feed must apply for this output, if any.
    fn video_scale(&self, session: &SessionState) -> Option<VideoScaleInfo> {
        if let Some(mut conversion) = session.video_conversion {
            let (w, h) = self.dimensions(session);
            if conversion.width == 0 {
                conversion.width = w;
            }
            if conversion.height == 0 {
                conversion.height = h;
            }
            return Some(conversion);
        }

        let (w, h) = session.scaled_size?;
        let feed = session.video.as_ref()?;
        if w == 0 || h == 0 || (w == feed.width() && h == feed.height()) {
            return None;
        }
        Some(VideoScaleInfo { width: w, height: h })
    }

    // -- Settings --

    pub fn set_reconnect_settings(&self, retry_max: u32, retry_delay_sec: u32) {
        self.reconnect.lock().set_limits(retry_max, retry_delay_sec);
    }

    pub fn settings(&self) -> OutputSettings {
        self.session.lock().settings.clone()
    }

    /// Apply settings and forward them to the sink.
    ///
    /// The mixer only changes while the output is inactive.
    pub fn apply_settings(&self, settings: &OutputSettings) -> Result<(), CaptureError> {
        settings.validate().map_err(CaptureError::InvalidSettings)?;
        if settings.tracks.as_ref().is_some_and(|t| t.len() > 1) && !self.is_multi_track() {
            return Err(CaptureError::InvalidSettings(
                "multiple tracks require a multi-track output".into(),
            ));
        }

        {
            let mut session = self.session.lock();
            if self.ensure_inactive(&session).is_ok() {
                session.mixer = settings.mixer_index();
            }
            session.settings = settings.clone();
        }

        self.set_reconnect_settings(settings.effective_max_retries(), settings.retry_delay);
        self.sink.update(settings);
        Ok(())
    }

    // -- Readiness --

    fn audio_mixes(&self, session: &SessionState) -> usize {
        if self.flags.contains(OutputFlags::SERVICE)
            && !session.service.as_ref().is_some_and(|s| s.supports_multitrack())
        {
            return 1;
        }
        session.binding.audio_mixes(self.is_multi_track())
    }

    /// Encoders an encoded capture needs, or the first one missing.
    ///
    /// Tracks listed in the settings of a multi-track output must all be
    /// bound, even beyond the carried run of slots.
    fn required_encoders(
        &self,
        session: &SessionState,
        plan: &CapturePlan,
    ) -> Result<(Option<Arc<Encoder>>, Vec<Arc<Encoder>>), CaptureError> {
        let video = if plan.has_video {
            Some(session.binding.video().cloned().ok_or(CaptureError::MissingVideoEncoder)?)
        } else {
            None
        };

        let mut audio = Vec::new();
        if plan.has_audio {
            let mixes = self.audio_mixes(session);
            if mixes == 0 {
                return Err(CaptureError::MissingAudioEncoder(0));
            }
            audio = session.binding.required_audio(mixes)?;

            if self.is_multi_track() {
                for track in session.settings.track_indices() {
                    session
                        .binding
                        .audio(track, true)
                        .ok_or(CaptureError::MissingAudioEncoder(track))?;
                }
            }
        }
        Ok((video, audio))
    }

    fn check_ready(&self, session: &SessionState, plan: &CapturePlan) -> Result<(), CaptureError> {
        let required: Vec<Arc<Encoder>> = if plan.encoded {
            let (video, audio) = self.required_encoders(session, plan)?;
            video.into_iter().chain(audio).collect()
        } else {
            if plan.has_video {
                session.video.as_ref().ok_or(CaptureError::MissingVideoFeed)?;
            }
            if plan.has_audio {
                session.audio.as_ref().ok_or(CaptureError::MissingAudioFeed)?;
            }
            Vec::new()
        };

        if plan.has_service && session.service.is_none() {
            return Err(CaptureError::MissingService);
        }

        if let Some(encoder) = required.iter().find(|e| !e.is_initialized()) {
            return Err(CaptureError::EncoderNotInitialized(encoder.name().to_string()));
        }
        Ok(())
    }

    /// Whether `begin_capture(flags)` would succeed right now.
    pub fn can_begin_capture(&self, flags: OutputFlags) -> Result<(), CaptureError> {
        let session = self.session.lock();
        if !session.state.can_begin() {
            return Err(CaptureError::OutputActive);
        }
        self.check_ready(&session, &CapturePlan::resolve(self.flags, flags))
    }

    /// Initialize the service and every bound encoder the capture needs.
    ///
    /// Stops at the first failure. With exactly one video and one audio
    /// encoder, neither active nor paired, the audio encoder is paired to
    /// wait for the first video packet. [`Output::start`] runs this for
    /// encoded outputs before the sink is started.
    pub fn initialize_encoders(&self, flags: OutputFlags) -> Result<(), CaptureError> {
        self.ensure_inactive(&self.session.lock())?;
        self.prepare_encoders(flags)
    }

    fn prepare_encoders(&self, flags: OutputFlags) -> Result<(), CaptureError> {
        let output = self.weak_self.upgrade().ok_or(CaptureError::Destroyed)?;

        let plan = CapturePlan::resolve(self.flags, flags);
        if !plan.encoded {
            return Err(CaptureError::Unsupported("encoders"));
        }

        let (service, video, audio) = {
            let session = self.session.lock();
            let service = if plan.has_service {
                Some(session.service.clone().ok_or(CaptureError::MissingService)?)
            } else {
                None
            };
            let (video, audio) = self.required_encoders(&session, &plan)?;
            (service, video, audio)
        };

        if let Some(service) = service {
            if !service.initialize(&output) {
                return Err(CaptureError::ServiceInitFailed(service.name().to_string()));
            }
        }
        if let Some(video) = &video {
            video.initialize()?;
        }
        for encoder in &audio {
            encoder.initialize()?;
        }

        if let (Some(video), [audio]) = (&video, audio.as_slice()) {
            if !video.is_active() && !audio.is_active() && !video.is_paired() && !audio.is_paired() {
                Encoder::pair(video, audio);
            }
        }
        Ok(())
    }

    // -- Capture lifecycle --

    /// Hook data delivery and move to `Active`.
    ///
    /// Called by the sink once its target is ready. Empty `flags` means
    /// everything the sink declares. Fails without touching the session if
    /// anything required is unbound or an encoder is not initialized.
    pub fn begin_capture(&self, flags: OutputFlags) -> Result<(), CaptureError> {
        {
            let mut buffer = self.interleave.lock();
            let mut session = self.session.lock();
            if !session.state.can_begin() {
                return Err(CaptureError::OutputActive);
            }

            let plan = CapturePlan::resolve(self.flags, flags);
            self.check_ready(&session, &plan)?;

            self.total_frames.store(0, Ordering::SeqCst);
            if plan.encoded {
                buffer.reset(self.audio_mixes(&session));
            }
            self.capturing.store(true, Ordering::SeqCst);
            self.hook_data_capture(&session, &plan);

            if plan.has_service {
                if let Some(service) = &session.service {
                    service.activate();
                }
            }

            session.state = CaptureState::Active;
            session.started_at = Some(Utc::now());
        }

        let event = {
            let mut reconnect = self.reconnect.lock();
            if reconnect.is_reconnecting() {
                reconnect.clear();
                OutputEvent::ReconnectSuccess
            } else {
                OutputEvent::Start
            }
        };

        log::info!("output '{}': capture started", self.name);
        self.notifier.emit(self, event);
        Ok(())
    }

    fn hook_data_capture(&self, session: &SessionState, plan: &CapturePlan) {
        if plan.encoded {
            let interleaved = plan.interleaved();
            if plan.has_video {
                if let Some(video) = session.binding.video() {
                    video.start(self.id, self.packet_callback(interleaved, 0));
                }
            }
            if plan.has_audio {
                for track in 0..self.audio_mixes(session) {
                    if let Some(audio) = session.binding.audio(track, self.is_multi_track()) {
                        audio.start(self.id, self.packet_callback(interleaved, track));
                    }
                }
            }
            return;
        }

        if plan.has_video {
            if let Some(feed) = &session.video {
                feed.connect(self.id, self.video_scale(session), self.raw_video_callback());
            }
        }
        if plan.has_audio {
            if let Some(feed) = &session.audio {
                feed.connect(session.mixer, self.id, session.audio_conversion, self.raw_audio_callback());
            }
        }
    }

    fn packet_callback(&self, interleaved: bool, track: usize) -> PacketCallback {
        let weak = self.weak_self.clone();
        Arc::new(move |packet: &Packet| {
            let Some(output) = weak.upgrade() else {
                return;
            };
            let mut packet = packet.clone();
            if packet.is_audio() {
                packet.track_index = track;
            }
            if interleaved {
                output.interleave_packet(packet);
            } else {
                output.deliver_packet(&packet);
            }
        })
    }

    /// Whether data may still reach the sink: active and not stopped.
    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    fn interleave_packet(&self, packet: Packet) {
        let mut buffer = self.interleave.lock();
        if !self.is_capturing() {
            return;
        }
        if let Some(ready) = buffer.interleave(packet) {
            self.deliver_packet(&ready);
        }
    }

    fn deliver_packet(&self, packet: &Packet) {
        if !self.is_capturing() {
            return;
        }
        if packet.is_video() {
            self.total_frames.fetch_add(1, Ordering::SeqCst);
        }
        self.sink.encoded_packet(packet);
    }

    fn raw_video_callback(&self) -> RawVideoCallback {
        let weak = self.weak_self.clone();
        Arc::new(move |frame: &RawVideoFrame| {
            if let Some(output) = weak.upgrade() {
                if output.is_capturing() {
                    output.total_frames.fetch_add(1, Ordering::SeqCst);
                    output.sink.raw_video(frame);
                }
            }
        })
    }

    fn raw_audio_callback(&self) -> RawAudioCallback {
        let weak = self.weak_self.clone();
        Arc::new(move |data: &RawAudioData| {
            if let Some(output) = weak.upgrade() {
                if output.is_capturing() {
                    output.sink.raw_audio(data);
                }
            }
        })
    }

    /// Unhook data delivery and return to `Idle`. No-op unless active or
    /// starting.
    ///
    /// Returns once no encoder callback for this output is still running,
    /// unless called from inside one.
    pub fn end_capture(&self) {
        let (encoders, video, audio, mixer, service) = {
            let mut session = self.session.lock();
            match session.state {
                CaptureState::Active => {}
                CaptureState::Starting => {
                    session.state = CaptureState::Idle;
                    return;
                }
                CaptureState::Idle | CaptureState::Stopping => return,
            }
            session.state = CaptureState::Stopping;
            self.capturing.store(false, Ordering::SeqCst);

            let encoders: Vec<Arc<Encoder>> = session.binding.encoders().cloned().collect();
            (
                encoders,
                session.video.clone(),
                session.audio.clone(),
                session.mixer,
                session.service.clone(),
            )
        };

        let plan = CapturePlan::resolve(self.flags, OutputFlags::empty());
        if plan.encoded {
            for encoder in &encoders {
                encoder.stop(self.id);
            }
        } else {
            if let Some(feed) = &video {
                feed.disconnect(self.id);
            }
            if let Some(feed) = &audio {
                feed.disconnect(mixer, self.id);
            }
        }

        if plan.has_service {
            if let Some(service) = &service {
                service.deactivate(false);
            }
        }

        self.session.lock().state = CaptureState::Idle;
        log::info!("output '{}': capture ended", self.name);
    }

    /// Initialize encoders (encoded outputs) and ask the sink to start. The
    /// sink calls [`Output::begin_capture`] when its target is ready,
    /// possibly after this returns.
    ///
    /// An encoder or service that fails to initialize leaves the output
    /// `Idle` and the sink untouched.
    pub fn start(&self) -> Result<(), CaptureError> {
        if !self.state().is_idle() {
            return Err(CaptureError::OutputActive);
        }
        self.stopped.store(false, Ordering::SeqCst);
        self.start_capture()
    }

    /// Start attempt shared with the reconnect worker. Refused once
    /// [`Output::stop`] has begun.
    fn start_capture(&self) -> Result<(), CaptureError> {
        let output = self.weak_self.upgrade().ok_or(CaptureError::Destroyed)?;

        if !self.state().is_idle() {
            return Err(CaptureError::OutputActive);
        }
        if self.stopped.load(Ordering::SeqCst) {
            return Err(CaptureError::Stopped);
        }
        if self.flags.contains(OutputFlags::ENCODED) {
            self.prepare_encoders(OutputFlags::empty())?;
        }

        {
            let mut session = self.session.lock();
            if !session.state.is_idle() {
                return Err(CaptureError::OutputActive);
            }
            session.state = CaptureState::Starting;
        }

        if !self.sink.start(&output) {
            let mut session = self.session.lock();
            if session.state == CaptureState::Starting {
                session.state = CaptureState::Idle;
            }
            log::warn!("output '{}': sink failed to start", self.name);
            return Err(CaptureError::SinkStartFailed);
        }

        let mut session = self.session.lock();
        if let Some(feed) = session.video.clone() {
            session.starting_frame_count = feed.total_frames();
            session.starting_skipped_frame_count = feed.skipped_frames();
        }
        Ok(())
    }

    /// Stop the capture on request.
    ///
    /// Cancels any pending reconnect wait and joins its worker before the
    /// sink is told to stop, so no further start attempt follows.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.cancel_reconnect();

        self.sink.stop();
        self.end_capture();
        self.reconnect.lock().clear();

        if let Some(stats) = self.frame_stats() {
            stats.log();
        }
        self.notifier.emit(self, OutputEvent::Stop { code: StopCode::Success });
    }

    fn cancel_reconnect(&self) {
        self.reconnect_stop.signal();
        let handle = self.reconnect_worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::warn!("output '{}': reconnect worker panicked", self.name);
            }
        }
    }

    /// Report that the capture ended with `code`.
    ///
    /// `Disconnected`, or any failure while a reconnect episode is under
    /// way, schedules another attempt. Everything else is terminal.
    pub fn signal_stop(&self, code: StopCode) {
        self.end_capture();

        let retry = {
            let reconnect = self.reconnect.lock();
            (code.is_retryable() || (reconnect.is_reconnecting() && code != StopCode::Success))
                && !self.stopped.load(Ordering::SeqCst)
        };

        if retry {
            self.schedule_reconnect();
        } else {
            self.reconnect.lock().clear();
            log::info!("output '{}': stopped ({})", self.name, code);
            self.notifier.emit(self, OutputEvent::Stop { code });
        }
    }

    fn schedule_reconnect(&self) {
        let (decision, entered) = self.reconnect.lock().next_attempt();

        let ReconnectDecision::Retry { attempt, delay_sec } = decision else {
            log::info!("output '{}': reconnect attempts exhausted", self.name);
            self.notifier.emit(self, OutputEvent::Stop { code: StopCode::Disconnected });
            return;
        };

        if entered {
            self.reconnect_stop.reset();
        }

        log::info!(
            "output '{}': Reconnecting in {} seconds (attempt {})..",
            self.name,
            delay_sec,
            attempt
        );
        self.notifier.emit(self, OutputEvent::Reconnect { delay_sec });

        let weak = self.weak_self.clone();
        let timer = Arc::clone(&self.timer);
        let stop = Arc::clone(&self.reconnect_stop);
        let spawned = thread::Builder::new()
            .name("output-reconnect".into())
            .spawn(move || reconnect_worker(weak, timer, stop, delay_sec));

        match spawned {
            Ok(handle) => {
                *self.reconnect_worker.lock() = Some(handle);
            }
            Err(e) => {
                log::error!("output '{}': failed to create reconnect thread: {}", self.name, e);
                self.reconnect.lock().clear();
                self.notifier.emit(self, OutputEvent::Stop { code: StopCode::Disconnected });
            }
        }
    }

    // -- Statistics --

    /// Video packets (or raw frames) delivered since the capture began.
    pub fn total_frames(&self) -> u32 {
        self.total_frames.load(Ordering::SeqCst)
    }

    pub fn frames_dropped(&self) -> u32 {
        self.sink.dropped_frames()
    }

    pub fn total_bytes(&self) -> u64 {
        self.sink.total_bytes()
    }

    /// Upstream frame accounting since the last start. `None` without a
    /// video feed.
    pub fn frame_stats(&self) -> Option<FrameStats> {
        let session = self.session.lock();
        let feed = session.video.as_ref()?;
        Some(FrameStats {
            output: self.name.clone(),
            total_frames: feed.total_frames().wrapping_sub(session.starting_frame_count),
            skipped_frames: feed.skipped_frames().wrapping_sub(session.starting_skipped_frame_count),
            dropped_frames: self.sink.dropped_frames(),
            started_at: session.started_at,
            stopped_at: Utc::now(),
        })
    }

    pub fn can_pause(&self) -> bool {
        self.sink.supports_pause()
    }

    pub fn pause(&self) -> Result<(), CaptureError> {
        if !self.can_pause() {
            return Err(CaptureError::Unsupported("pause"));
        }
        self.sink.pause();
        Ok(())
    }
}

fn reconnect_worker(output: Weak<Output>, timer: Arc<dyn ReconnectTimer>, stop: Arc<StopEvent>, delay_sec: u64) {
    if timer.wait(Duration::from_secs(delay_sec), &stop) == WaitOutcome::Cancelled {
        return;
    }

    let Some(output) = output.upgrade() else {
        return;
    };
    if stop.is_signaled() {
        return;
    }

    match output.start_capture() {
        Ok(()) | Err(CaptureError::Stopped) => {}
        Err(e) => {
            log::error!("output '{}': reconnect attempt failed: {}", output.name, e);
            output.signal_stop(StopCode::ConnectFailed);
        }
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.cancel_reconnect();

        let was_active = !self.session.get_mut().state.is_idle();
        if was_active {
            self.sink.stop();
            self.end_capture();
            self.notifier.emit(self, OutputEvent::Stop { code: StopCode::Success });
        }

        let id = self.id;
        let session = self.session.get_mut();
        for encoder in session.binding.encoders() {
            encoder.stop(id);
            encoder.remove_output(id);
        }
        if let Some(service) = &session.service {
            if service.owner_id() == Some(id) {
                service.set_owner(None);
            }
        }

        log::info!("output '{}' destroyed", self.name);
    }
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("flags", &self.flags)
            .finish()
    }
}
