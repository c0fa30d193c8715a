//! Core data model shared by every stage: committed tokens, the tentative
//! suffixes that precede them, speaker intervals, translations and the
//! aligned `Segment` timeline built from all three.

use serde::{Deserialize, Serialize};

/// Speaker marker for a silenced span. Never assigned to real speech.
pub const SPEAKER_SILENCE: i32 = -2;
/// Speaker marker meaning "not yet diarized and diarization is disabled or
/// failed".
pub const SPEAKER_UNASSIGNED: i32 = -1;
/// Speaker marker meaning "diarization is enabled but this span has not
/// been resolved yet".
pub const SPEAKER_PENDING: i32 = 0;

/// An atomic committed unit of transcript.
///
/// Tokens for a session form a sequence strictly non-decreasing in
/// `start`, and once a token is published its `start` never changes —
/// see the session-state invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub probability: Option<f32>,
    pub speaker: i32,
    pub language: Option<String>,
}

impl Token {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            probability: None,
            speaker: SPEAKER_UNASSIGNED,
            language: None,
        }
    }

    /// A token marking a span of silence, per the AlignAtt silence-gap
    /// convention (a time gap represented as a `-2` speaker marker).
    pub fn silence_marker(start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            text: String::new(),
            probability: None,
            speaker: SPEAKER_SILENCE,
            language: None,
        }
    }

    pub fn is_silence_marker(&self) -> bool {
        self.speaker == SPEAKER_SILENCE
    }

    /// Whether `text` ends with a sentence-terminal character, per the
    /// conservative cross-script rule: `.?!。？！` followed by whitespace
    /// or end of string (checked by the caller, which holds the following
    /// token if any).
    pub fn ends_sentence(&self) -> bool {
        self.text
            .trim_end()
            .chars()
            .next_back()
            .map(|c| matches!(c, '.' | '?' | '!' | '。' | '？' | '！'))
            .unwrap_or(false)
    }
}

/// The unstable suffix of the transcript not yet committed. Replaced in
/// full on each publication — never patched incrementally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TentativeBuffer {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl TentativeBuffer {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Relative speaker labelling over a time range, post-processed (ID
/// stabilization, boundary smoothing, minimum duration) by the Diarizer
/// before reaching the Aligner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerInterval {
    pub speaker: i32,
    pub start: f64,
    pub end: f64,
}

impl SpeakerInterval {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Length of the overlap between this interval and `[start, end)`.
    /// Zero if disjoint.
    pub fn intersection(&self, start: f64, end: f64) -> f64 {
        let lo = self.start.max(start);
        let hi = self.end.min(end);
        (hi - lo).max(0.0)
    }
}

/// A translated span aligned to a group of committed tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// A display-level grouping of committed tokens belonging to one speaker,
/// bounded by a sentence terminator, a speaker change, or a 1.5s gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub speaker: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_language: Option<String>,
}

/// Process-wide state for one session. Mutated only by the Aligner's tick,
/// which is the sole writer — reached only from the session's own task, so
/// no additional lock is required around `SessionState` itself.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub committed_tokens: Vec<Token>,
    pub tentative: TentativeBuffer,
    pub speaker_intervals: Vec<SpeakerInterval>,
    pub translations: Vec<Translation>,
    pub end_of_committed_audio: f64,
    pub end_of_diarized_audio: f64,

    /// Deltas produced since the last Aligner tick, consumed and cleared
    /// on each tick.
    pub new_tokens: Vec<Token>,
    pub new_speaker_intervals: Vec<SpeakerInterval>,
    pub new_translations: Vec<Translation>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the three delta buffers, returning their previous contents.
    pub fn take_deltas(&mut self) -> (Vec<Token>, Vec<SpeakerInterval>, Vec<Translation>) {
        (
            std::mem::take(&mut self.new_tokens),
            std::mem::take(&mut self.new_speaker_intervals),
            std::mem::take(&mut self.new_translations),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ends_sentence_recognizes_ascii_and_cjk_terminators() {
        assert!(Token::new(0.0, 1.0, "Hello world.").ends_sentence());
        assert!(Token::new(0.0, 1.0, "你好。").ends_sentence());
        assert!(!Token::new(0.0, 1.0, "Hello world").ends_sentence());
    }

    #[test]
    fn interval_intersection_is_zero_when_disjoint() {
        let iv = SpeakerInterval {
            speaker: 1,
            start: 0.0,
            end: 1.0,
        };
        assert_eq!(iv.intersection(2.0, 3.0), 0.0);
        assert!((iv.intersection(0.5, 1.5) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn silence_marker_has_speaker_minus_two() {
        let t = Token::silence_marker(1.0, 2.0);
        assert!(t.is_silence_marker());
        assert_eq!(t.speaker, SPEAKER_SILENCE);
    }
}
