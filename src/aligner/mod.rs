//! Aligner: the single writer of the displayable transcript timeline.
//! Joins committed tokens, speaker intervals and translations on the time
//! axis into ordered `Segment`s. Runs entirely in-process against the
//! deltas handed to it each tick — no channel of its own per §5 (direct
//! in-memory appends under the session lock).

use crate::model::{Segment, SpeakerInterval, TentativeBuffer, Token, Translation};
use crate::model::{SPEAKER_PENDING, SPEAKER_SILENCE, SPEAKER_UNASSIGNED};

/// Tokens further apart than this start a new segment even with no
/// speaker change or sentence terminator.
const SEGMENT_GAP_SECS: f64 = 1.5;
/// Tolerance used when deciding whether a translation's span belongs
/// inside a segment's span.
const TRANSLATION_TOLERANCE_SECS: f64 = 0.1;

#[derive(Debug, Clone, Default)]
pub struct AlignerOutput {
    pub segments: Vec<Segment>,
    pub tentative: TentativeBuffer,
    pub diarization_tentative: String,
    pub translation_tentative: String,
    pub remaining_time_transcription: f64,
    pub remaining_time_diarization: f64,
}

pub struct Aligner {
    diarization_enabled: bool,
    tokens: Vec<Token>,
    intervals: Vec<SpeakerInterval>,
    translations: Vec<Translation>,
    end_of_diarized_audio: f64,
}

impl Aligner {
    pub fn new(diarization_enabled: bool) -> Self {
        Self {
            diarization_enabled,
            tokens: Vec::new(),
            intervals: Vec::new(),
            translations: Vec::new(),
            end_of_diarized_audio: 0.0,
        }
    }

    fn assign_speaker(&self, token: &Token) -> i32 {
        let mut best: Option<(&SpeakerInterval, f64)> = None;
        for interval in &self.intervals {
            let overlap = interval.intersection(token.start, token.end);
            if overlap <= 0.0 {
                continue;
            }
            match &best {
                None => best = Some((interval, overlap)),
                Some((best_iv, best_overlap)) => {
                    if overlap > *best_overlap
                        || (overlap == *best_overlap && interval.start < best_iv.start)
                    {
                        best = Some((interval, overlap));
                    }
                }
            }
        }
        best.map(|(iv, _)| iv.speaker).unwrap_or(token.speaker)
    }

    /// Re-run speaker assignment over tokens touched by newly finalized
    /// diarization, per the "largest intersection, ties to earlier
    /// interval, otherwise keep current assignment" rule.
    fn reassign_speakers(&mut self) {
        if !self.diarization_enabled {
            return;
        }
        let end_of_diarized_audio = self.end_of_diarized_audio;
        let assignments: Vec<(usize, i32)> = self
            .tokens
            .iter()
            .enumerate()
            .filter_map(|(idx, t)| {
                if t.is_silence_marker() {
                    return None;
                }
                if t.end <= end_of_diarized_audio {
                    Some((idx, self.assign_speaker(t)))
                } else if t.speaker == SPEAKER_UNASSIGNED {
                    Some((idx, SPEAKER_PENDING))
                } else {
                    None
                }
            })
            .collect();
        for (idx, speaker) in assignments {
            self.tokens[idx].speaker = speaker;
        }
    }

    fn build_segments(&self) -> Vec<Segment> {
        let mut segments: Vec<Segment> = Vec::new();
        let mut prev: Option<&Token> = None;

        for token in &self.tokens {
            let starts_new = match prev {
                None => true,
                Some(p) => {
                    p.speaker != token.speaker
                        || p.ends_sentence()
                        || token.start - p.end > SEGMENT_GAP_SECS
                }
            };

            if starts_new {
                segments.push(Segment {
                    start: token.start,
                    end: token.end,
                    text: token.text.clone(),
                    speaker: token.speaker,
                    translation: None,
                    detected_language: token.language.clone(),
                });
            } else {
                let seg = segments.last_mut().expect("starts_new is false only after the first segment exists");
                seg.end = token.end;
                seg.text.push_str(&token.text);
            }
            prev = Some(token);
        }

        for segment in &mut segments {
            let parts: Vec<&str> = self
                .translations
                .iter()
                .filter(|tr| {
                    tr.start >= segment.start - TRANSLATION_TOLERANCE_SECS
                        && tr.end <= segment.end + TRANSLATION_TOLERANCE_SECS
                })
                .map(|tr| tr.text.as_str())
                .collect();
            if !parts.is_empty() {
                segment.translation = Some(parts.join(" "));
            }
        }

        segments
    }

    /// Integrate one tick's deltas and recompute the displayable timeline.
    #[allow(clippy::too_many_arguments)]
    pub fn tick(
        &mut self,
        new_tokens: Vec<Token>,
        new_speaker_intervals: Vec<SpeakerInterval>,
        new_translations: Vec<Translation>,
        end_of_diarized_audio: f64,
        tentative: TentativeBuffer,
        diarization_tentative: String,
        translation_tentative: String,
        ingress_time: f64,
        transcriber_head_time: f64,
        diarizer_head_time: f64,
    ) -> AlignerOutput {
        self.tokens.extend(new_tokens);
        self.intervals.extend(new_speaker_intervals);
        self.translations.extend(new_translations);
        self.end_of_diarized_audio = self.end_of_diarized_audio.max(end_of_diarized_audio);

        self.reassign_speakers();
        let segments = self.build_segments();

        AlignerOutput {
            segments,
            tentative,
            diarization_tentative,
            translation_tentative,
            remaining_time_transcription: (ingress_time - transcriber_head_time).max(0.0),
            remaining_time_diarization: (ingress_time - diarizer_head_time).max(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(start: f64, end: f64, text: &str) -> Token {
        let mut t = Token::new(start, end, text);
        t.speaker = SPEAKER_UNASSIGNED;
        t
    }

    #[test]
    fn single_speaker_tokens_group_into_one_segment() {
        let mut a = Aligner::new(true);
        let intervals = vec![SpeakerInterval { speaker: 1, start: 0.0, end: 2.0 }];
        let tokens = vec![
            token(0.1, 0.5, "Hello "),
            token(0.6, 1.0, "world."),
        ];
        let out = a.tick(tokens, intervals, vec![], 2.0, TentativeBuffer::default(), String::new(), String::new(), 2.0, 2.0, 2.0);
        assert_eq!(out.segments.len(), 1);
        assert_eq!(out.segments[0].text, "Hello world.");
        assert_eq!(out.segments[0].speaker, 1);
    }

    #[test]
    fn speaker_change_splits_into_two_segments() {
        let mut a = Aligner::new(true);
        let intervals = vec![
            SpeakerInterval { speaker: 1, start: 0.0, end: 2.0 },
            SpeakerInterval { speaker: 2, start: 2.0, end: 4.0 },
        ];
        let tokens = vec![
            token(0.0, 1.9, "before"),
            token(2.1, 3.0, "after"),
        ];
        let out = a.tick(tokens, intervals, vec![], 4.0, TentativeBuffer::default(), String::new(), String::new(), 4.0, 4.0, 4.0);
        assert_eq!(out.segments.len(), 2);
        assert_eq!(out.segments[0].speaker, 1);
        assert_eq!(out.segments[1].speaker, 2);
    }

    #[test]
    fn token_straddling_boundary_is_assigned_by_majority_overlap() {
        let mut a = Aligner::new(true);
        let intervals = vec![
            SpeakerInterval { speaker: 1, start: 0.0, end: 2.0 },
            SpeakerInterval { speaker: 2, start: 2.0, end: 4.0 },
        ];
        // straddles 2.0 with 0.3s in speaker 1, 0.7s in speaker 2
        let tokens = vec![token(1.7, 2.7, "straddle")];
        let out = a.tick(tokens, intervals, vec![], 4.0, TentativeBuffer::default(), String::new(), String::new(), 4.0, 4.0, 4.0);
        assert_eq!(out.segments[0].speaker, 2);
    }

    #[test]
    fn gap_over_threshold_starts_new_segment_even_with_same_speaker() {
        let mut a = Aligner::new(true);
        let intervals = vec![SpeakerInterval { speaker: 1, start: 0.0, end: 10.0 }];
        let tokens = vec![token(0.0, 1.0, "first"), token(3.0, 4.0, "second")];
        let out = a.tick(tokens, intervals, vec![], 10.0, TentativeBuffer::default(), String::new(), String::new(), 10.0, 10.0, 10.0);
        assert_eq!(out.segments.len(), 2);
    }

    #[test]
    fn pending_tokens_beyond_diarized_audio_are_marked_pending() {
        let mut a = Aligner::new(true);
        let tokens = vec![token(5.0, 5.5, "future")];
        let out = a.tick(tokens, vec![], vec![], 0.0, TentativeBuffer::default(), String::new(), String::new(), 5.5, 5.5, 0.0);
        assert_eq!(out.segments[0].speaker, SPEAKER_PENDING);
    }

    #[test]
    fn diarization_disabled_keeps_tokens_unassigned() {
        let mut a = Aligner::new(false);
        let tokens = vec![token(0.0, 1.0, "hi")];
        let out = a.tick(tokens, vec![], vec![], 0.0, TentativeBuffer::default(), String::new(), String::new(), 1.0, 1.0, 0.0);
        assert_eq!(out.segments[0].speaker, SPEAKER_UNASSIGNED);
    }

    #[test]
    fn translation_within_tolerance_attaches_to_segment() {
        let mut a = Aligner::new(false);
        let tokens = vec![token(0.0, 1.0, "hi")];
        let translations = vec![Translation { start: -0.05, end: 1.05, text: "salut".into() }];
        let out = a.tick(tokens, vec![], translations, 0.0, TentativeBuffer::default(), String::new(), String::new(), 1.0, 1.0, 0.0);
        assert_eq!(out.segments[0].translation.as_deref(), Some("salut"));
    }

    #[test]
    fn silence_marker_becomes_its_own_segment() {
        let mut a = Aligner::new(false);
        let mut silence = Token::silence_marker(0.0, 2.0);
        silence.speaker = SPEAKER_SILENCE;
        let tokens = vec![silence];
        let out = a.tick(tokens, vec![], vec![], 0.0, TentativeBuffer::default(), String::new(), String::new(), 2.0, 2.0, 0.0);
        assert_eq!(out.segments.len(), 1);
        assert_eq!(out.segments[0].speaker, SPEAKER_SILENCE);
    }

    #[test]
    fn remaining_time_is_floored_at_zero() {
        let mut a = Aligner::new(false);
        let out = a.tick(vec![], vec![], vec![], 0.0, TentativeBuffer::default(), String::new(), String::new(), 5.0, 7.0, 9.0);
        assert_eq!(out.remaining_time_transcription, 0.0);
        assert_eq!(out.remaining_time_diarization, 0.0);
    }
}
