//! Diarizer: consumes a PCM tap and the raw speaker intervals the
//! underlying model reports, and post-processes them into stable,
//! session-wide speaker labels. The core never re-clusters — only ID
//! stabilization, boundary smoothing and minimum-duration filtering.

use tracing::warn;

use crate::error::Result;
use crate::external::diarizer::{Diarizer as DiarizerModel, RawSpeakerInterval};
use crate::model::SpeakerInterval;

/// Adjacent same-speaker intervals separated by less than this are merged.
const BOUNDARY_SMOOTHING_SECS: f64 = 0.2;
/// Intervals shorter than this are discarded outright.
const MIN_DURATION_SECS: f64 = 0.1;

/// Post-processing stage wrapping an external diarization model.
pub struct Diarizer {
    model: Box<dyn DiarizerModel>,
    /// Map from the model's internal cluster ID to a stable session label,
    /// assigned in order of first appearance. Never reused.
    label_map: Vec<i64>,
    end_of_diarized_audio: f64,
    /// Finalized, post-processed intervals, in time order.
    intervals: Vec<SpeakerInterval>,
    degraded: bool,
}

impl Diarizer {
    pub fn new(model: Box<dyn DiarizerModel>) -> Self {
        Self {
            model,
            label_map: Vec::new(),
            end_of_diarized_audio: 0.0,
            intervals: Vec::new(),
            degraded: false,
        }
    }

    pub fn end_of_diarized_audio(&self) -> f64 {
        self.end_of_diarized_audio
    }

    /// `true` once the underlying model has failed; the session continues
    /// with all speakers left unassigned per `DiarizerFailure`'s degraded
    /// recovery policy, rather than treating this as fatal.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    fn stable_label(&mut self, internal_id: i64) -> i32 {
        if let Some(pos) = self.label_map.iter().position(|id| *id == internal_id) {
            return pos as i32 + 1;
        }
        self.label_map.push(internal_id);
        self.label_map.len() as i32
    }

    /// Feed a PCM chunk aligned to `stream_time` and return the new
    /// intervals finalized on this call (the delta, already
    /// post-processed and merged into this diarizer's running timeline).
    pub fn feed(&mut self, pcm_chunk: &[i16], stream_time: f64) -> Result<Vec<SpeakerInterval>> {
        if self.degraded {
            return Ok(vec![]);
        }

        let raw = match self.model.feed(pcm_chunk, stream_time) {
            Ok(r) => r,
            Err(e) => {
                warn!("diarizer failed, degrading to unassigned for the rest of the session: {e}");
                self.degraded = true;
                return Ok(vec![]);
            }
        };

        let mut delta = Vec::new();
        let intervals_len_before_call = self.intervals.len();
        for RawSpeakerInterval {
            internal_speaker_id,
            start,
            end,
        } in raw
        {
            if end <= start {
                continue;
            }
            let speaker = self.stable_label(internal_speaker_id);
            self.end_of_diarized_audio = self.end_of_diarized_audio.max(end);

            if let Some(last) = self.intervals.last_mut() {
                if last.speaker == speaker && start - last.end < BOUNDARY_SMOOTHING_SECS {
                    last.end = last.end.max(end);
                    let merged = last.clone();
                    // If `last` was itself pushed earlier in this same call,
                    // its delta entry is already in `delta` and must be
                    // corrected in place; otherwise it predates this call
                    // and the extension has to be re-emitted so consumers
                    // see the corrected boundary at all.
                    if self.intervals.len() > intervals_len_before_call {
                        match delta.last_mut() {
                            Some(d) => *d = merged,
                            None => delta.push(merged),
                        }
                    } else {
                        delta.push(merged);
                    }
                    continue;
                }
            }
            let interval = SpeakerInterval { speaker, start, end };
            if interval.duration() < MIN_DURATION_SECS {
                continue;
            }
            self.intervals.push(interval.clone());
            delta.push(interval);
        }
        Ok(delta)
    }
}
