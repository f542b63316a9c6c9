use serde::{Deserialize, Serialize};

use super::error::CaptureError;
use super::flags::MAX_AUDIO_MIXES;

/// Engine-level default delay before the first reconnect attempt.
pub const DEFAULT_RETRY_DELAY_SECS: u32 = 2;

/// Engine-level default number of reconnect attempts per episode.
pub const DEFAULT_MAX_RETRIES: u32 = 20;

/// Output knobs read from external configuration.
///
/// Keys mirror the profile ini keys (`Reconnect`, `RetryDelay`, ...). Track
/// numbers are 1-based, as they are shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OutputSettings {
    /// Reconnect automatically after a disconnect (default: true).
    pub reconnect: bool,

    /// Delay before the first reconnect attempt, in seconds (default: 2).
    pub retry_delay: u32,

    /// Attempts per reconnect episode (default: 20).
    pub max_retries: u32,

    /// Mixer used by single-track and raw outputs, 1-based (default: 1).
    pub track_index: u32,

    /// Tracks carried by a multi-track output, 1-based. Every listed track
    /// must have an audio encoder bound before the capture can begin.
    pub tracks: Option<Vec<u32>>,
}

impl OutputSettings {
    pub fn from_json(json: &str) -> Result<Self, CaptureError> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| CaptureError::InvalidSettings(format!("failed to parse settings: {}", e)))?;
        settings.validate().map_err(CaptureError::InvalidSettings)?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.reconnect && self.retry_delay == 0 {
            return Err("retry delay must be at least one second".into());
        }
        if !(1..=MAX_AUDIO_MIXES as u32).contains(&self.track_index) {
            return Err(format!("track index out of range: {}", self.track_index));
        }
        if let Some(tracks) = &self.tracks {
            if tracks.is_empty() {
                return Err("track list is empty".into());
            }
            for (i, track) in tracks.iter().enumerate() {
                if !(1..=MAX_AUDIO_MIXES as u32).contains(track) {
                    return Err(format!("track out of range: {}", track));
                }
                if tracks[..i].contains(track) {
                    return Err(format!("duplicate track: {}", track));
                }
            }
        }
        Ok(())
    }

    /// Zero-based mixer index for single-track and raw outputs.
    pub fn mixer_index(&self) -> usize {
        self.track_index.saturating_sub(1) as usize
    }

    /// Zero-based audio slots named by `tracks`, empty when unset.
    pub fn track_indices(&self) -> Vec<usize> {
        self.tracks
            .iter()
            .flatten()
            .map(|t| t.saturating_sub(1) as usize)
            .collect()
    }

    /// Retry budget the reconnection controller should use.
    ///
    /// Disabling reconnect is expressed as a budget of zero attempts, so a
    /// disconnect is reported straight away.
    pub fn effective_max_retries(&self) -> u32 {
        if self.reconnect {
            self.max_retries
        } else {
            0
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            reconnect: true,
            retry_delay: DEFAULT_RETRY_DELAY_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            track_index: 1,
            tracks: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = OutputSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.mixer_index(), 0);
        assert_eq!(settings.effective_max_retries(), 20);
    }

    #[test]
    fn parses_ini_style_keys() {
        let settings = OutputSettings::from_json(
            r#"{ "Reconnect": true, "RetryDelay": 10, "MaxRetries": 5, "TrackIndex": 3 }"#,
        )
        .unwrap();

        assert_eq!(settings.retry_delay, 10);
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.mixer_index(), 2);
        assert_eq!(settings.tracks, None);
    }

    #[test]
    fn disabled_reconnect_has_no_budget() {
        let settings = OutputSettings::from_json(r#"{ "Reconnect": false, "RetryDelay": 0 }"#).unwrap();
        assert_eq!(settings.effective_max_retries(), 0);
    }

    #[test]
    fn rejects_bad_tracks() {
        let mut settings = OutputSettings::default();

        settings.track_index = 0;
        assert!(settings.validate().is_err());

        settings.track_index = 1;
        settings.tracks = Some(vec![1, 5]);
        assert!(settings.validate().is_err());

        settings.tracks = Some(vec![2, 2]);
        assert!(settings.validate().is_err());

        settings.tracks = Some(vec![]);
        assert!(settings.validate().is_err());

        settings.tracks = Some(vec![1, 2, 4]);
        assert!(settings.validate().is_ok());
        assert_eq!(settings.track_indices(), [0, 1, 3]);
    }

    #[test]
    fn malformed_json_is_invalid_settings() {
        let err = OutputSettings::from_json("{ \"RetryDelay\": \"soon\" }").unwrap_err();
        assert!(matches!(err, CaptureError::InvalidSettings(_)));
    }
}
