use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::models::config::OutputSettings;
use crate::models::error::CaptureError;
use crate::session::encoder::Encoder;
use crate::session::output::{Output, OutputBuilder};
use crate::session::reconnect::{EventTimer, ReconnectTimer};
use crate::session::service::Service;
use crate::traits::encoder_backend::EncoderBackend;
use crate::traits::media_feed::{AudioFeed, VideoFeed};
use crate::traits::service_backend::ServiceBackend;
use crate::traits::sink::OutputSink;

/// Explicit engine context: the upstream feeds every output shares, plus a
/// name registry of live outputs, encoders and services.
///
/// The registry holds weak references only; dropping the last handle to an
/// object removes it.
pub struct CaptureContext {
    video: Option<Arc<dyn VideoFeed>>,
    audio: Option<Arc<dyn AudioFeed>>,
    timer: Arc<dyn ReconnectTimer>,
    outputs: RwLock<Vec<Weak<Output>>>,
    encoders: RwLock<Vec<Weak<Encoder>>>,
    services: RwLock<Vec<Weak<Service>>>,
}

impl CaptureContext {
    pub fn new() -> Self {
        Self {
            video: None,
            audio: None,
            timer: Arc::new(EventTimer),
            outputs: RwLock::new(Vec::new()),
            encoders: RwLock::new(Vec::new()),
            services: RwLock::new(Vec::new()),
        }
    }

    pub fn with_video_feed(mut self, feed: Arc<dyn VideoFeed>) -> Self {
        self.video = Some(feed);
        self
    }

    pub fn with_audio_feed(mut self, feed: Arc<dyn AudioFeed>) -> Self {
        self.audio = Some(feed);
        self
    }

    pub fn with_reconnect_timer(mut self, timer: Arc<dyn ReconnectTimer>) -> Self {
        self.timer = timer;
        self
    }

    /// Create an output wired to this context's feeds and timer.
    pub fn create_output(
        &self,
        name: &str,
        sink: Arc<dyn OutputSink>,
        settings: Option<OutputSettings>,
    ) -> Result<Arc<Output>, CaptureError> {
        let mut builder = OutputBuilder::new(name, sink).reconnect_timer(Arc::clone(&self.timer));
        if let Some(feed) = &self.video {
            builder = builder.video_feed(Arc::clone(feed));
        }
        if let Some(feed) = &self.audio {
            builder = builder.audio_feed(Arc::clone(feed));
        }
        if let Some(settings) = settings {
            builder = builder.settings(settings);
        }

        let output = builder.build()?;
        register(&self.outputs, &output);
        Ok(output)
    }

    pub fn create_encoder(&self, backend: impl EncoderBackend + 'static) -> Arc<Encoder> {
        let encoder = Encoder::new(backend);
        register(&self.encoders, &encoder);
        encoder
    }

    pub fn create_service(&self, backend: impl ServiceBackend + 'static) -> Arc<Service> {
        let service = Service::new(backend);
        register(&self.services, &service);
        service
    }

    pub fn output_by_name(&self, name: &str) -> Option<Arc<Output>> {
        live(&self.outputs).into_iter().find(|o| o.name() == name)
    }

    pub fn encoder_by_name(&self, name: &str) -> Option<Arc<Encoder>> {
        live(&self.encoders).into_iter().find(|e| e.name() == name)
    }

    pub fn service_by_name(&self, name: &str) -> Option<Arc<Service>> {
        live(&self.services).into_iter().find(|s| s.name() == name)
    }

    pub fn outputs(&self) -> Vec<Arc<Output>> {
        live(&self.outputs)
    }

    /// Stop every active output.
    pub fn stop_all(&self) {
        for output in live(&self.outputs) {
            if output.is_active() {
                output.stop();
            }
        }
    }
}

impl Default for CaptureContext {
    fn default() -> Self {
        Self::new()
    }
}

fn register<T>(list: &RwLock<Vec<Weak<T>>>, item: &Arc<T>) {
    let mut list = list.write();
    list.retain(|weak| weak.strong_count() > 0);
    list.push(Arc::downgrade(item));
}

fn live<T>(list: &RwLock<Vec<Weak<T>>>) -> Vec<Arc<T>> {
    list.read().iter().filter_map(Weak::upgrade).collect()
}
