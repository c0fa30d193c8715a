//! Diarization capability interface. The core trusts the model's relative
//! speaker IDs and only post-processes them (see `crate::diarizer`).

use crate::error::Result;

/// One speaker-labelled span as reported directly by the underlying
/// model, before ID stabilization, boundary smoothing or minimum-duration
/// filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSpeakerInterval {
    /// The model's own internal cluster ID — not yet a stable session
    /// label.
    pub internal_speaker_id: i64,
    pub start: f64,
    pub end: f64,
}

pub trait Diarizer: Send {
    /// Feed a PCM chunk aligned to `stream_time` (the start time of
    /// `pcm_chunk` in session time) and get back whatever intervals the
    /// model has finalized so far.
    fn feed(&mut self, pcm_chunk: &[i16], stream_time: f64) -> Result<Vec<RawSpeakerInterval>>;
}
