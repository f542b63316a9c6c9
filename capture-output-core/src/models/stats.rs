use chrono::{DateTime, Utc};
use serde::Serialize;

/// Frame accounting for one capture, reported when an output stops.
///
/// Serializable for JSON export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameStats {
    pub output: String,
    /// Frames produced upstream since the capture started.
    pub total_frames: u32,
    /// Frames the upstream video clock skipped since the capture started.
    pub skipped_frames: u32,
    /// Frames the sink reports as dropped.
    pub dropped_frames: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: DateTime<Utc>,
}

impl FrameStats {
    pub fn skipped_percentage(&self) -> f64 {
        percentage(self.skipped_frames, self.total_frames)
    }

    pub fn dropped_percentage(&self) -> f64 {
        percentage(self.dropped_frames, self.total_frames)
    }

    pub(crate) fn log(&self) {
        log::info!("Output '{}': stopping", self.output);
        log::info!("Output '{}': Total frames: {}", self.output, self.total_frames);

        if self.total_frames > 0 {
            log::info!(
                "Output '{}': Number of skipped frames: {} ({:.2}%)",
                self.output,
                self.skipped_frames,
                self.skipped_percentage()
            );
        }

        if self.dropped_frames > 0 {
            log::info!(
                "Output '{}': Number of dropped frames: {} ({:.2}%)",
                self.output,
                self.dropped_frames,
                self.dropped_percentage()
            );
        }
    }
}

fn percentage(part: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}
