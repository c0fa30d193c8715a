//! Session configuration, fixed for the lifetime of a session at startup.

use serde::{Deserialize, Serialize};

/// Which transcriber stabilization policy a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendPolicy {
    AlignAtt,
    LocalAgreement,
}

/// Where `LocalAgreement` trims its suffix window once it grows past
/// `local_agreement_window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferTrimming {
    Sentence,
    Segment,
}

/// How a `Segment`'s `start`/`end` are rendered to the subscriber. Fixed
/// per session at startup per the subscriber interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeFormat {
    Seconds,
    Clock,
}

/// Session-start configuration, matching the subscriber's initial `config`
/// snapshot field-for-field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub backend_policy: BackendPolicy,
    /// Source language, or `"auto"` for language detection.
    pub language: String,
    /// Target language for translation, empty string if `translation` is off.
    pub target_language: String,
    pub diarization: bool,
    pub translation: bool,
    /// `true` if ingress frames are already 16 kHz mono s16le PCM (no Decoder).
    pub pcm_input: bool,

    // AlignAtt tuning.
    /// Encoder frames treated as "too close to the stream tail" to fire on.
    pub frame_threshold: u32,
    /// Tail-mass threshold below which a candidate token commits.
    pub fire_threshold: f32,
    pub beam_size: u32,

    // LocalAgreement tuning.
    pub buffer_trimming: BufferTrimming,

    pub publish_hz: f64,

    #[serde(default = "default_time_format")]
    pub time_format: TimeFormat,
}

fn default_time_format() -> TimeFormat {
    TimeFormat::Seconds
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend_policy: BackendPolicy::AlignAtt,
            language: "auto".to_string(),
            target_language: String::new(),
            diarization: true,
            translation: false,
            pcm_input: false,
            frame_threshold: 25,
            fire_threshold: 0.25,
            beam_size: 1,
            buffer_trimming: BufferTrimming::Sentence,
            publish_hz: 20.0,
            time_format: TimeFormat::Seconds,
        }
    }
}
