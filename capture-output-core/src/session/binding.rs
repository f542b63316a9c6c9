use std::sync::Arc;

use crate::models::error::CaptureError;
use crate::models::flags::MAX_AUDIO_MIXES;
use crate::models::id::EncoderId;
use crate::models::packet::PacketKind;
use crate::session::encoder::Encoder;

/// Which encoders feed an output: one video slot and `MAX_AUDIO_MIXES`
/// audio slots.
///
/// The binding only enforces slot rules. Keeping encoders' output lists in
/// sync and refusing changes while active is the owning output's job.
#[derive(Debug, Default, Clone)]
pub struct TrackBinding {
    video: Option<Arc<Encoder>>,
    audio: [Option<Arc<Encoder>>; MAX_AUDIO_MIXES],
}

impl TrackBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn video(&self) -> Option<&Arc<Encoder>> {
        self.video.as_ref()
    }

    /// Audio encoder at `track`, respecting the single/multi-track range.
    pub fn audio(&self, track: usize, multi_track: bool) -> Option<&Arc<Encoder>> {
        check_track(track, multi_track).ok()?;
        self.audio[track].as_ref()
    }

    /// Replace the video encoder. Returns the encoder that was there before,
    /// or `Ok(None)` with no change if `encoder` is already bound.
    pub fn set_video(&mut self, encoder: Option<Arc<Encoder>>) -> Result<Option<Arc<Encoder>>, CaptureError> {
        if let Some(enc) = &encoder {
            check_kind(enc, PacketKind::Video)?;
        }
        if same(&self.video, &encoder) {
            return Ok(None);
        }
        Ok(std::mem::replace(&mut self.video, encoder))
    }

    /// Replace the audio encoder at `track`. Same contract as [`Self::set_video`].
    pub fn set_audio(
        &mut self,
        encoder: Option<Arc<Encoder>>,
        track: usize,
        multi_track: bool,
    ) -> Result<Option<Arc<Encoder>>, CaptureError> {
        if let Some(enc) = &encoder {
            check_kind(enc, PacketKind::Audio)?;
        }
        check_track(track, multi_track)?;
        if same(&self.audio[track], &encoder) {
            return Ok(None);
        }
        Ok(std::mem::replace(&mut self.audio[track], encoder))
    }

    /// Clear whichever slot holds `id`. Returns `true` if something was cleared.
    pub fn remove(&mut self, id: EncoderId) -> bool {
        if self.video.as_ref().is_some_and(|e| e.id() == id) {
            self.video = None;
            return true;
        }

        let mut removed = false;
        for slot in self.audio.iter_mut() {
            if slot.as_ref().is_some_and(|e| e.id() == id) {
                *slot = None;
                removed = true;
            }
        }
        removed
    }

    /// Number of audio tracks a capture will carry.
    ///
    /// Single-track outputs always carry one. Multi-track outputs carry the
    /// contiguous run of bound slots starting at track 0.
    pub fn audio_mixes(&self, multi_track: bool) -> usize {
        if !multi_track {
            return 1;
        }
        self.audio.iter().take_while(|slot| slot.is_some()).count()
    }

    /// The audio encoders for the first `mixes` tracks, or the first missing
    /// track index.
    pub fn required_audio(&self, mixes: usize) -> Result<Vec<Arc<Encoder>>, CaptureError> {
        (0..mixes.min(MAX_AUDIO_MIXES))
            .map(|track| self.audio[track].clone().ok_or(CaptureError::MissingAudioEncoder(track)))
            .collect()
    }

    /// Every bound encoder, video first.
    pub fn encoders(&self) -> impl Iterator<Item = &Arc<Encoder>> {
        self.video.iter().chain(self.audio.iter().flatten())
    }
}

fn check_kind(encoder: &Encoder, expected: PacketKind) -> Result<(), CaptureError> {
    if encoder.kind() == expected {
        return Ok(());
    }
    Err(CaptureError::EncoderKindMismatch {
        encoder: encoder.name().to_string(),
        expected: match expected {
            PacketKind::Video => "video",
            PacketKind::Audio => "audio",
        },
    })
}

fn check_track(track: usize, multi_track: bool) -> Result<(), CaptureError> {
    let limit = if multi_track { MAX_AUDIO_MIXES } else { 1 };
    if track >= limit {
        return Err(CaptureError::TrackOutOfRange(track));
    }
    Ok(())
}

fn same(a: &Option<Arc<Encoder>>, b: &Option<Arc<Encoder>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}
