//! Policy B: LocalAgreement (hypothesis buffering). Stability over
//! latency — re-transcribes a suffix window each tick and commits the
//! longest common prefix against the previous tick's hypothesis.

use tracing::warn;

use super::{normalize_word, TickOutput, Transcriber};
use crate::config::BufferTrimming;
use crate::error::{Error, Result};
use crate::external::asr::{AsrWholeChunkTranscriber, WordHyp};
use crate::model::{TentativeBuffer, Token, SPEAKER_UNASSIGNED};

/// Default bound on the suffix window before it is trimmed from the
/// front (seconds).
pub const DEFAULT_MAX_SUFFIX_SECS: f64 = 15.0;
/// Consecutive tick failures before the session is escalated as fatal.
const MAX_CONSECUTIVE_FAILURES: u32 = 5;
const SAMPLE_RATE: f64 = 16_000.0;

pub struct LocalAgreementTranscriber {
    asr: Box<dyn AsrWholeChunkTranscriber>,
    language_hint: String,
    max_suffix_secs: f64,
    buffer_trimming: BufferTrimming,

    /// PCM accumulated since the anchor (`last_committed_end`).
    suffix_audio: Vec<i16>,
    /// Absolute stream time of `suffix_audio[0]`.
    suffix_base_time: f64,
    last_committed_end: f64,

    /// The previous tick's hypothesis, restricted to the part beyond the
    /// last commit, for LCP comparison against the next tick.
    previous_suffix_hypothesis: Vec<WordHyp>,

    tentative: TentativeBuffer,
    consecutive_failures: u32,
}

impl LocalAgreementTranscriber {
    pub fn new(asr: Box<dyn AsrWholeChunkTranscriber>, language_hint: impl Into<String>) -> Self {
        Self {
            asr,
            language_hint: language_hint.into(),
            max_suffix_secs: DEFAULT_MAX_SUFFIX_SECS,
            buffer_trimming: BufferTrimming::Sentence,
            suffix_audio: Vec::new(),
            suffix_base_time: 0.0,
            last_committed_end: 0.0,
            previous_suffix_hypothesis: Vec::new(),
            tentative: TentativeBuffer::default(),
            consecutive_failures: 0,
        }
    }

    /// Select where the suffix window is trimmed once it exceeds
    /// `max_suffix_secs`: at the nearest sentence boundary (`Sentence`,
    /// the default — favors not splitting tentative text mid-sentence) or
    /// immediately at the last committed time (`Segment` — favors a
    /// smaller window over sentence continuity).
    pub fn with_buffer_trimming(mut self, buffer_trimming: BufferTrimming) -> Self {
        self.buffer_trimming = buffer_trimming;
        self
    }

    fn trim_if_needed(&mut self) {
        let secs = self.suffix_audio.len() as f64 / SAMPLE_RATE;
        if secs <= self.max_suffix_secs {
            return;
        }
        // `Sentence`: trim at a sentence boundary in the previous
        // hypothesis if one exists past the anchor, else at the last
        // committed time. `Segment`: always trim at the last committed
        // time, ignoring sentence boundaries.
        let sentence_cut = match self.buffer_trimming {
            BufferTrimming::Sentence => self
                .previous_suffix_hypothesis
                .iter()
                .rev()
                .find(|w| {
                    w.word
                        .trim_end()
                        .chars()
                        .next_back()
                        .map(|c| matches!(c, '.' | '?' | '!' | '。' | '？' | '！'))
                        .unwrap_or(false)
                })
                .map(|w| w.end),
            BufferTrimming::Segment => None,
        };

        let anchor = sentence_cut.unwrap_or(self.last_committed_end);
        let keep_from = ((anchor - self.suffix_base_time) * SAMPLE_RATE).max(0.0) as usize;
        let keep_from = keep_from.min(self.suffix_audio.len());
        self.suffix_audio.drain(..keep_from);
        self.suffix_base_time = anchor;
        self.previous_suffix_hypothesis
            .retain(|w| w.start >= anchor);
    }
}

impl Transcriber for LocalAgreementTranscriber {
    fn insert_audio(&mut self, chunk: &[i16], stream_time: f64) {
        if self.suffix_audio.is_empty() {
            self.suffix_base_time = stream_time;
        }
        self.suffix_audio.extend_from_slice(chunk);
    }

    fn start_silence(&mut self) {}

    fn end_silence(&mut self, _duration: f64) {}

    fn tick(&mut self) -> Result<TickOutput> {
        if self.suffix_audio.is_empty() {
            return Ok(TickOutput {
                new_committed_tokens: vec![],
                new_end_of_committed_audio: self.last_committed_end,
            });
        }

        let hypothesis = match self.asr.transcribe(&self.suffix_audio, &self.language_hint) {
            Ok(h) => h,
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    streak = self.consecutive_failures,
                    "local_agreement tick failed, skipping: {e}"
                );
                if self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    return Err(Error::AsrPersistent {
                        streak: self.consecutive_failures,
                        detail: e.to_string(),
                    });
                }
                return Ok(TickOutput {
                    new_committed_tokens: vec![],
                    new_end_of_committed_audio: self.last_committed_end,
                });
            }
        };
        self.consecutive_failures = 0;

        // Ignore hypothesis words that go backward relative to the last
        // commit.
        let hypothesis: Vec<WordHyp> = hypothesis
            .into_iter()
            .filter(|w| w.start >= self.last_committed_end - 1e-6)
            .collect();

        // Edge case: empty current hypothesis with a non-empty previous
        // one commits nothing (the fresh hypothesis retracted it).
        if hypothesis.is_empty() {
            self.previous_suffix_hypothesis = hypothesis;
            self.tentative = TentativeBuffer::default();
            return Ok(TickOutput {
                new_committed_tokens: vec![],
                new_end_of_committed_audio: self.last_committed_end,
            });
        }

        let lcp_len = self
            .previous_suffix_hypothesis
            .iter()
            .zip(hypothesis.iter())
            .take_while(|(prev, cur)| normalize_word(&prev.word) == normalize_word(&cur.word))
            .count();

        let mut new_committed_tokens = Vec::new();
        for w in hypothesis.iter().take(lcp_len) {
            let mut token = Token::new(w.start, w.end, w.word.clone());
            token.probability = w.probability;
            token.speaker = SPEAKER_UNASSIGNED;
            self.last_committed_end = self.last_committed_end.max(w.end);
            new_committed_tokens.push(token);
        }

        let remainder = &hypothesis[lcp_len..];
        self.tentative = if let (Some(first), Some(last)) = (remainder.first(), remainder.last()) {
            TentativeBuffer {
                start: first.start,
                end: last.end,
                text: remainder
                    .iter()
                    .map(|w| w.word.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
            }
        } else {
            TentativeBuffer::default()
        };

        self.previous_suffix_hypothesis = remainder.to_vec();
        self.trim_if_needed();

        Ok(TickOutput {
            new_committed_tokens,
            new_end_of_committed_audio: self.last_committed_end,
        })
    }

    fn tentative(&self) -> &TentativeBuffer {
        &self.tentative
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedAsr {
        ticks: Vec<Vec<&'static str>>,
        idx: usize,
    }

    impl AsrWholeChunkTranscriber for ScriptedAsr {
        fn transcribe(&mut self, _pcm: &[i16], _language_hint: &str) -> Result<Vec<WordHyp>> {
            let words = self.ticks.get(self.idx).cloned().unwrap_or_default();
            self.idx += 1;
            Ok(words
                .into_iter()
                .enumerate()
                .map(|(i, w)| WordHyp {
                    word: w.to_string(),
                    start: i as f64,
                    end: i as f64 + 0.5,
                    probability: Some(0.9),
                })
                .collect())
        }
    }

    fn feed_one_tick(t: &mut LocalAgreementTranscriber) {
        t.insert_audio(&vec![0i16; 1600], t.suffix_base_time);
    }

    #[test]
    fn lcp_commit_grows_across_three_ticks() {
        let mut t = LocalAgreementTranscriber::new(
            Box::new(ScriptedAsr {
                ticks: vec![vec!["Hello"], vec!["Hello", "world"], vec!["Hello", "world", "how"]],
                idx: 0,
            }),
            "en",
        );

        feed_one_tick(&mut t);
        t.tick().unwrap(); // tick 1: nothing committed yet (no previous hypothesis)

        feed_one_tick(&mut t);
        let out2 = t.tick().unwrap();
        let committed2: Vec<_> = out2.new_committed_tokens.iter().map(|t| t.text.clone()).collect();
        assert_eq!(committed2, vec!["Hello"]);

        feed_one_tick(&mut t);
        let out3 = t.tick().unwrap();
        let committed3: Vec<_> = out3.new_committed_tokens.iter().map(|t| t.text.clone()).collect();
        assert_eq!(committed3, vec!["world"]);
        assert_eq!(t.tentative().text, "how");
    }

    #[test]
    fn mismatch_prevents_commit_past_the_common_prefix() {
        let mut t = LocalAgreementTranscriber::new(
            Box::new(ScriptedAsr {
                ticks: vec![vec!["Hello", "wurld"], vec!["Hello", "world"]],
                idx: 0,
            }),
            "en",
        );

        feed_one_tick(&mut t);
        t.tick().unwrap();
        feed_one_tick(&mut t);
        let out = t.tick().unwrap();
        // "Hello" was already committed on tick 1 (no previous hypothesis
        // to compare against, so nothing committed there); this tick's
        // LCP against ["Hello", "wurld"] stops at "world" != "wurld".
        assert!(out.new_committed_tokens.is_empty() || out.new_committed_tokens[0].text == "Hello");
        assert_eq!(t.tentative().text, "world");
    }

    #[test]
    fn empty_fresh_hypothesis_commits_nothing() {
        let mut t = LocalAgreementTranscriber::new(
            Box::new(ScriptedAsr {
                ticks: vec![vec!["Hello"], vec![]],
                idx: 0,
            }),
            "en",
        );
        feed_one_tick(&mut t);
        t.tick().unwrap();
        feed_one_tick(&mut t);
        let out = t.tick().unwrap();
        assert!(out.new_committed_tokens.is_empty());
    }
}
