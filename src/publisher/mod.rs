//! Publisher: the differential emitter at the end of the pipeline. Calls
//! the Aligner on a fixed cadence (driven by the session task), fingerprints
//! the result, and only emits a snapshot to the subscriber when the
//! fingerprint changes. `remaining_time_*` is kept live between full
//! emissions via a cheap in-place mutation on the last snapshot.

use serde::{Deserialize, Serialize};

use crate::aligner::AlignerOutput;
use crate::model::Segment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Active,
    NoAudio,
    Finalized,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub status: Status,
    pub lines: Vec<Segment>,
    pub buffer_transcription: String,
    pub buffer_diarization: String,
    pub buffer_translation: String,
    pub remaining_time_transcription: f64,
    pub remaining_time_diarization: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            status: Status::NoAudio,
            lines: Vec::new(),
            buffer_transcription: String::new(),
            buffer_diarization: String::new(),
            buffer_translation: String::new(),
            remaining_time_transcription: 0.0,
            remaining_time_diarization: 0.0,
            error_kind: None,
        }
    }
}

fn fingerprint(snapshot: &Snapshot) -> String {
    serde_json::json!({
        "status": snapshot.status,
        "lines": snapshot.lines,
        "buffer_transcription": snapshot.buffer_transcription,
        "buffer_diarization": snapshot.buffer_diarization,
        "buffer_translation": snapshot.buffer_translation,
        "error_kind": snapshot.error_kind,
    })
    .to_string()
}

pub struct Publisher {
    last_fingerprint: Option<String>,
    current: Snapshot,
    finalized: bool,
}

impl Publisher {
    pub fn new() -> Self {
        Self {
            last_fingerprint: None,
            current: Snapshot::default(),
            finalized: false,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// The live view, with `remaining_time_*` always current even between
    /// full emissions.
    pub fn current(&self) -> &Snapshot {
        &self.current
    }

    fn from_aligner(aligner_output: &AlignerOutput, status: Status, error_kind: Option<String>) -> Snapshot {
        Snapshot {
            status,
            lines: aligner_output.segments.clone(),
            buffer_transcription: aligner_output.tentative.text.clone(),
            buffer_diarization: aligner_output.diarization_tentative.clone(),
            buffer_translation: aligner_output.translation_tentative.clone(),
            remaining_time_transcription: aligner_output.remaining_time_transcription,
            remaining_time_diarization: aligner_output.remaining_time_diarization,
            error_kind,
        }
    }

    /// One publish cadence tick. Returns `Some(snapshot)` only when the
    /// fingerprint changed; `remaining_time_*` is always refreshed on
    /// `current()` regardless.
    pub fn tick(&mut self, aligner_output: &AlignerOutput, status: Status, error_kind: Option<String>) -> Option<Snapshot> {
        if self.finalized {
            return None;
        }
        let snapshot = Self::from_aligner(aligner_output, status, error_kind);
        self.current.remaining_time_transcription = snapshot.remaining_time_transcription;
        self.current.remaining_time_diarization = snapshot.remaining_time_diarization;

        let fp = fingerprint(&snapshot);
        if Some(&fp) == self.last_fingerprint.as_ref() {
            return None;
        }
        self.last_fingerprint = Some(fp);
        self.current = snapshot.clone();
        Some(snapshot)
    }

    /// Force the terminal emission regardless of fingerprint, then close
    /// the publisher to further emissions (invariant: nothing is emitted
    /// after `ready_to_stop`).
    pub fn finalize(&mut self, aligner_output: &AlignerOutput, error_kind: Option<String>) -> Snapshot {
        let status = if error_kind.is_some() { Status::Error } else { Status::Finalized };
        let snapshot = Self::from_aligner(aligner_output, status, error_kind);
        self.current = snapshot.clone();
        self.last_fingerprint = Some(fingerprint(&snapshot));
        self.finalized = true;
        snapshot
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TentativeBuffer;

    fn empty_output() -> AlignerOutput {
        AlignerOutput {
            segments: vec![],
            tentative: TentativeBuffer::default(),
            diarization_tentative: String::new(),
            translation_tentative: String::new(),
            remaining_time_transcription: 0.0,
            remaining_time_diarization: 0.0,
        }
    }

    #[test]
    fn identical_content_does_not_re_emit() {
        let mut p = Publisher::new();
        let out = empty_output();
        assert!(p.tick(&out, Status::NoAudio, None).is_some());
        assert!(p.tick(&out, Status::NoAudio, None).is_none());
    }

    #[test]
    fn remaining_time_updates_live_even_without_emission() {
        let mut p = Publisher::new();
        let mut out = empty_output();
        p.tick(&out, Status::NoAudio, None).unwrap();
        out.remaining_time_transcription = 2.5;
        assert!(p.tick(&out, Status::NoAudio, None).is_none());
        assert_eq!(p.current().remaining_time_transcription, 2.5);
    }

    #[test]
    fn no_emission_after_finalize() {
        let mut p = Publisher::new();
        let out = empty_output();
        p.finalize(&out, None);
        assert!(p.is_finalized());
        assert!(p.tick(&out, Status::Active, None).is_none());
    }

    #[test]
    fn changed_buffer_text_triggers_re_emission() {
        let mut p = Publisher::new();
        let mut out = empty_output();
        p.tick(&out, Status::NoAudio, None).unwrap();
        out.tentative.text = "hi".into();
        assert!(p.tick(&out, Status::Active, None).is_some());
    }
}
