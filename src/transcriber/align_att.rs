//! Policy A: AlignAtt (attention-fire). Low-latency stabilization by
//! inspecting how much of a candidate token's cross-attention still
//! falls on the live edge of the encoder window.

use tracing::{debug, warn};

use super::{TickOutput, Transcriber};
use crate::error::{Error, Result};
use crate::external::asr::{AsrDecoder, AsrEncoder};
use crate::model::{TentativeBuffer, Token, SPEAKER_UNASSIGNED};

/// Default bound on the rolling audio window (seconds).
pub const DEFAULT_MAX_WINDOW_SECS: f64 = 30.0;
/// Bound on committed tokens decoded within a single tick, so one tick
/// cannot run forever if the model is unexpectedly fluent.
const MAX_TOKENS_PER_TICK: usize = 64;
/// Bound on greedy continuation appended to the tentative buffer text.
const MAX_TENTATIVE_TOKENS: usize = 8;
/// Consecutive decode failures before the session is escalated as fatal.
const MAX_CONSECUTIVE_FAILURES: u32 = 5;
const SAMPLE_RATE: f64 = 16_000.0;

pub struct AlignAttTranscriber {
    encoder: Box<dyn AsrEncoder>,
    decoder: Box<dyn AsrDecoder>,

    frame_threshold: usize,
    fire_threshold: f32,
    beam_size: u32,
    max_window_secs: f64,

    /// PCM accumulated for the current rolling window.
    audio_window: Vec<i16>,
    /// Absolute stream time of `audio_window[0]`.
    window_base_time: f64,
    /// End time of the last committed token — the AlignAtt trim/reset
    /// anchor.
    last_committed_end: f64,

    tentative: TentativeBuffer,
    consecutive_failures: u32,
}

impl AlignAttTranscriber {
    pub fn new(
        encoder: Box<dyn AsrEncoder>,
        decoder: Box<dyn AsrDecoder>,
        frame_threshold: u32,
        fire_threshold: f32,
    ) -> Self {
        Self {
            encoder,
            decoder,
            frame_threshold: frame_threshold as usize,
            fire_threshold,
            beam_size: 1,
            max_window_secs: DEFAULT_MAX_WINDOW_SECS,
            audio_window: Vec::new(),
            window_base_time: 0.0,
            last_committed_end: 0.0,
            tentative: TentativeBuffer::default(),
            consecutive_failures: 0,
        }
    }

    /// Apply a non-default beam width to the underlying decoder.
    pub fn with_beam_size(mut self, beam_size: u32) -> Self {
        self.beam_size = beam_size;
        self.decoder.set_beam_size(beam_size);
        self
    }

    pub fn beam_size(&self) -> u32 {
        self.beam_size
    }

    fn reset_to_last_committed(&mut self) {
        self.audio_window.clear();
        self.window_base_time = self.last_committed_end;
        self.tentative = TentativeBuffer::default();
        self.decoder.reset();
    }

    fn trim_if_needed(&mut self) {
        let window_secs = self.audio_window.len() as f64 / SAMPLE_RATE;
        if window_secs <= self.max_window_secs {
            return;
        }
        let anchor = self.last_committed_end;
        let keep_from_sample = ((anchor - self.window_base_time) * SAMPLE_RATE).max(0.0) as usize;
        let keep_from_sample = keep_from_sample.min(self.audio_window.len());
        self.audio_window.drain(..keep_from_sample);
        self.window_base_time = anchor;
        self.decoder.trim_cache(anchor);
    }
}

impl Transcriber for AlignAttTranscriber {
    fn insert_audio(&mut self, chunk: &[i16], stream_time: f64) {
        if self.audio_window.is_empty() {
            self.window_base_time = stream_time;
        }
        self.audio_window.extend_from_slice(chunk);
    }

    fn start_silence(&mut self) {
        debug!("align_att: start_silence — any committed tokens already flushed via tick()");
    }

    fn end_silence(&mut self, duration: f64) {
        debug!(duration, "align_att: end_silence — time gap noted, no audio inserted");
    }

    fn tick(&mut self) -> Result<TickOutput> {
        if self.audio_window.is_empty() {
            return Ok(TickOutput {
                new_committed_tokens: vec![],
                new_end_of_committed_audio: self.last_committed_end,
            });
        }

        let frames = match self.encoder.encode(&self.audio_window) {
            Ok(f) => f,
            Err(e) => return self.handle_failure(e),
        };

        let mut new_committed_tokens = Vec::new();
        let time_per_frame = frames.time_per_frame();
        let frame_count = frames.frame_count();

        for _ in 0..MAX_TOKENS_PER_TICK {
            let (candidate, attention) = match self.decoder.step(frames.as_ref()) {
                Ok(v) => v,
                Err(e) => return self.handle_failure(e),
            };

            if candidate.is_end_of_utterance {
                break;
            }

            let tail_frames = self.frame_threshold.min(attention.len());
            let tail_mass: f32 = attention[attention.len() - tail_frames..].iter().sum();

            if tail_mass <= self.fire_threshold {
                let peak_idx = attention
                    .iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| a.total_cmp(b))
                    .map(|(idx, _)| idx)
                    .unwrap_or(0);
                let start = self.window_base_time + peak_idx as f64 * time_per_frame;
                let end = (start + time_per_frame).max(start);

                let mut token = Token::new(start, end, candidate.text);
                token.probability = candidate.probability;
                token.speaker = SPEAKER_UNASSIGNED;

                self.last_committed_end = self.last_committed_end.max(end);
                new_committed_tokens.push(token);
                self.tentative = TentativeBuffer::default();
            } else {
                self.tentative = TentativeBuffer {
                    start: self.last_committed_end,
                    end: self.window_base_time + frame_count as f64 * time_per_frame,
                    text: candidate.text,
                };
                break;
            }
        }

        self.consecutive_failures = 0;
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

impl AlignAttTranscriber {
    fn handle_failure(&mut self, e: Error) -> Result<TickOutput> {
        self.consecutive_failures += 1;
        warn!(
            streak = self.consecutive_failures,
            "align_att decode step failed: {e}"
        );
        if self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
            return Err(Error::AsrPersistent {
                streak: self.consecutive_failures,
                detail: e.to_string(),
            });
        }
        self.reset_to_last_committed();
        Ok(TickOutput {
            new_committed_tokens: vec![],
            new_end_of_committed_audio: self.last_committed_end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as CrateResult;
    use crate::external::asr::{AttentionOverTime, EncoderFrames, TokenCandidate};

    struct FixedFrames {
        count: usize,
    }
    impl EncoderFrames for FixedFrames {
        fn frame_count(&self) -> usize {
            self.count
        }
        fn time_per_frame(&self) -> f64 {
            0.02
        }
    }

    struct ScriptedEncoder;
    impl AsrEncoder for ScriptedEncoder {
        fn encode(&mut self, pcm: &[i16]) -> CrateResult<Box<dyn EncoderFrames>> {
            Ok(Box::new(FixedFrames {
                count: (pcm.len() / 320).max(1),
            }))
        }
    }

    /// Decoder that fires every token immediately (attention peak at
    /// frame 0, far from the tail) until `script` is exhausted, then
    /// reports end-of-utterance.
    struct ScriptedDecoder {
        script: Vec<&'static str>,
        idx: usize,
    }
    impl AsrDecoder for ScriptedDecoder {
        fn step(
            &mut self,
            frames: &dyn EncoderFrames,
        ) -> CrateResult<(TokenCandidate, AttentionOverTime)> {
            if self.idx >= self.script.len() {
                return Ok((
                    TokenCandidate {
                        text: String::new(),
                        probability: None,
                        is_end_of_utterance: true,
                    },
                    vec![0.0; frames.frame_count().max(1)],
                ));
            }
            let text = self.script[self.idx].to_string();
            self.idx += 1;
            let mut attention = vec![0.0f32; frames.frame_count().max(1)];
            attention[0] = 1.0; // all mass far from the tail -> fires immediately
            Ok((
                TokenCandidate {
                    text,
                    probability: Some(0.95),
                    is_end_of_utterance: false,
                },
                attention,
            ))
        }
        fn reset(&mut self) {
            self.idx = 0;
        }
        fn trim_cache(&mut self, _anchor_time: f64) {}
    }

    fn transcriber(script: Vec<&'static str>) -> AlignAttTranscriber {
        AlignAttTranscriber::new(
            Box::new(ScriptedEncoder),
            Box::new(ScriptedDecoder { script, idx: 0 }),
            25,
            0.25,
        )
    }

    #[test]
    fn commits_tokens_whose_attention_is_far_from_the_tail() {
        let mut t = transcriber(vec!["Hello", "world"]);
        t.insert_audio(&vec![0i16; 16_000], 0.0);
        let out = t.tick().unwrap();
        assert_eq!(out.new_committed_tokens.len(), 2);
        assert_eq!(out.new_committed_tokens[0].text, "Hello");
        assert_eq!(out.new_committed_tokens[1].text, "world");
    }

    #[test]
    fn empty_window_produces_no_tokens() {
        let mut t = transcriber(vec!["Hello"]);
        let out = t.tick().unwrap();
        assert!(out.new_committed_tokens.is_empty());
    }

    #[test]
    fn tail_anchored_candidate_stays_tentative() {
        struct TailDecoder;
        impl AsrDecoder for TailDecoder {
            fn step(
                &mut self,
                frames: &dyn EncoderFrames,
            ) -> CrateResult<(TokenCandidate, AttentionOverTime)> {
                let n = frames.frame_count().max(1);
                let mut attention = vec![0.0f32; n];
                attention[n - 1] = 1.0; // all mass on the live edge
                Ok((
                    TokenCandidate {
                        text: "live".into(),
                        probability: Some(0.5),
                        is_end_of_utterance: false,
                    },
                    attention,
                ))
            }
            fn reset(&mut self) {}
            fn trim_cache(&mut self, _anchor_time: f64) {}
        }

        let mut t = AlignAttTranscriber::new(Box::new(ScriptedEncoder), Box::new(TailDecoder), 25, 0.25);
        t.insert_audio(&vec![0i16; 16_000], 0.0);
        let out = t.tick().unwrap();
        assert!(out.new_committed_tokens.is_empty());
        assert_eq!(t.tentative().text, "live");
    }

    #[test]
    fn persistent_failure_escalates_after_five_ticks() {
        struct FailingEncoder;
        impl AsrEncoder for FailingEncoder {
            fn encode(&mut self, _pcm: &[i16]) -> CrateResult<Box<dyn EncoderFrames>> {
                Err(Error::AsrTransient("boom".into()))
            }
        }
        struct NoopDecoder;
        impl AsrDecoder for NoopDecoder {
            fn step(
                &mut self,
                _frames: &dyn EncoderFrames,
            ) -> CrateResult<(TokenCandidate, AttentionOverTime)> {
                unreachable!("encoder always fails first")
            }
            fn reset(&mut self) {}
            fn trim_cache(&mut self, _anchor_time: f64) {}
        }

        let mut t = AlignAttTranscriber::new(Box::new(FailingEncoder), Box::new(NoopDecoder), 25, 0.25);
        t.insert_audio(&vec![0i16; 16_000], 0.0);
        for _ in 0..MAX_CONSECUTIVE_FAILURES - 1 {
            let out = t.tick().unwrap();
            assert!(out.new_committed_tokens.is_empty());
            t.insert_audio(&vec![0i16; 16_000], 1.0);
        }
        let result = t.tick();
        assert!(matches!(result, Err(Error::AsrPersistent { .. })));
    }
}
