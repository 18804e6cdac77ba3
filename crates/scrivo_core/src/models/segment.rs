//! Time-aligned transcript segments.

use serde::{Deserialize, Serialize};

/// One speaker-attributed span of speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start_time: f64,
    pub end_time: f64,
    pub speaker_id: String,
    pub text: String,
    /// 0.0 - 1.0 when the provider reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Segment {
    pub fn new(
        start_time: f64,
        end_time: f64,
        speaker_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            start_time,
            end_time,
            speaker_id: speaker_id.into(),
            text: text.into(),
            confidence: None,
        }
    }

    pub fn duration(&self) -> f64 {
        (self.end_time - self.start_time).max(0.0)
    }
}

/// Whether segments are ordered by start time.
pub fn is_ordered(segments: &[Segment]) -> bool {
    segments.windows(2).all(|w| w[0].start_time <= w[1].start_time)
}
