//! Deterministic stand-ins for the external model interfaces.
//!
//! No real inference: each stub derives its output from simple, fixed
//! arithmetic over its input so behavior is fully predictable run to run.
//! Used to exercise the pipeline end-to-end when no real model is
//! configured (the demo binary's default) and as building blocks for
//! scripted unit tests elsewhere in the crate.

use super::asr::{AsrDecoder, AsrEncoder, AsrWholeChunkTranscriber, AttentionOverTime, EncoderFrames, TokenCandidate, WordHyp};
use super::diarizer::{Diarizer, RawSpeakerInterval};
use super::translator::Translator;
use super::vad::{Vad, VadEdge};
use crate::error::Result;

/// Energy-free VAD stub: treats every non-silent-looking window (any
/// sample above a fixed epsilon) as voice, with no hangover. Useful for
/// smoke-testing the gate without a real model.
#[derive(Debug, Default)]
pub struct StubVad {
    was_voiced: bool,
    samples_seen: u64,
}

impl Vad for StubVad {
    fn feed(&mut self, samples_512: &[f32]) -> Result<VadEdge> {
        let voiced = samples_512.iter().any(|s| s.abs() > 1e-4);
        let window_start = self.samples_seen;
        self.samples_seen += samples_512.len() as u64;

        let edge = match (self.was_voiced, voiced) {
            (false, true) => VadEdge {
                start: Some(window_start),
                end: None,
            },
            (true, false) => VadEdge {
                start: None,
                end: Some(window_start),
            },
            _ => VadEdge::default(),
        };
        self.was_voiced = voiced;
        Ok(edge)
    }

    fn reset(&mut self) {
        self.was_voiced = false;
        self.samples_seen = 0;
    }
}

/// Whole-chunk ASR stub: reports one fixed word per ~0.4s of audio,
/// evenly spanning the chunk. Deterministic given chunk length alone.
#[derive(Debug, Default)]
pub struct StubWholeChunkAsr;

impl AsrWholeChunkTranscriber for StubWholeChunkAsr {
    fn transcribe(&mut self, pcm: &[i16], _language_hint: &str) -> Result<Vec<WordHyp>> {
        const SAMPLE_RATE: f64 = 16_000.0;
        const WORD_SAMPLES: usize = 6_400; // 0.4s
        if pcm.is_empty() {
            return Ok(vec![]);
        }
        let words = pcm
            .chunks(WORD_SAMPLES)
            .enumerate()
            .map(|(i, chunk)| {
                let start = (i * WORD_SAMPLES) as f64 / SAMPLE_RATE;
                let end = start + chunk.len() as f64 / SAMPLE_RATE;
                WordHyp {
                    word: format!("word{i}"),
                    start,
                    end,
                    probability: Some(0.9),
                }
            })
            .collect();
        Ok(words)
    }
}

/// Diarizer stub: alternates between two internal speaker IDs every 2s of
/// fed audio.
#[derive(Debug, Default)]
pub struct StubDiarizer {
    emitted_up_to: f64,
}

impl Diarizer for StubDiarizer {
    fn feed(&mut self, pcm_chunk: &[i16], stream_time: f64) -> Result<Vec<RawSpeakerInterval>> {
        const SAMPLE_RATE: f64 = 16_000.0;
        let end = stream_time + pcm_chunk.len() as f64 / SAMPLE_RATE;
        if end <= self.emitted_up_to {
            return Ok(vec![]);
        }
        let start = self.emitted_up_to.max(stream_time);
        let bucket = (start / 2.0).floor() as i64;
        self.emitted_up_to = end;
        Ok(vec![RawSpeakerInterval {
            internal_speaker_id: bucket % 2,
            start,
            end,
        }])
    }
}

/// Translator stub: a deterministic placeholder transform so tests can
/// assert translation attachment without a real model.
#[derive(Debug, Default)]
pub struct StubTranslator;

impl Translator for StubTranslator {
    fn translate(&mut self, _source_lang: &str, target_lang: &str, text: &str) -> Result<String> {
        Ok(format!("[{target_lang}] {text}"))
    }
}

/// Streaming ASR encoder stub for `AlignAtt`: one frame per 320 samples
/// (20ms at 16kHz), matching `StubAsrDecoder`'s per-frame cadence.
#[derive(Debug, Default)]
pub struct StubAsrEncoder;

struct StubEncoderFrames {
    count: usize,
}

impl EncoderFrames for StubEncoderFrames {
    fn frame_count(&self) -> usize {
        self.count
    }
    fn time_per_frame(&self) -> f64 {
        0.02
    }
}

impl AsrEncoder for StubAsrEncoder {
    fn encode(&mut self, pcm: &[i16]) -> Result<Box<dyn EncoderFrames>> {
        Ok(Box::new(StubEncoderFrames {
            count: (pcm.len() / 320).max(1),
        }))
    }
}

/// Streaming ASR decoder stub for `AlignAtt`: emits one fixed word per 20
/// encoder frames (0.4s), the same per-word cadence as
/// `StubWholeChunkAsr`, with all attention mass on frame 0 so every token
/// fires immediately rather than staying tentative. Reports
/// end-of-utterance once the window is exhausted.
#[derive(Debug, Default)]
pub struct StubAsrDecoder {
    idx: usize,
}

impl AsrDecoder for StubAsrDecoder {
    fn step(&mut self, frames: &dyn EncoderFrames) -> Result<(TokenCandidate, AttentionOverTime)> {
        const FRAMES_PER_WORD: usize = 20;
        let frame_count = frames.frame_count();
        if (self.idx + 1) * FRAMES_PER_WORD > frame_count {
            return Ok((candidate("", 0.0, true), vec![0.0; frame_count.max(1)]));
        }
        let text = format!("word{}", self.idx);
        self.idx += 1;
        let mut attention = vec![0.0f32; frame_count.max(1)];
        attention[0] = 1.0;
        Ok((candidate(&text, 0.9, false), attention))
    }

    fn reset(&mut self) {
        self.idx = 0;
    }

    fn trim_cache(&mut self, _anchor_time: f64) {}
}

/// A `TokenCandidate` builder used by scripted AlignAtt tests and the stub
/// decoder to keep construction terse.
pub fn candidate(text: &str, probability: f32, end_of_utterance: bool) -> TokenCandidate {
    TokenCandidate {
        text: text.to_string(),
        probability: Some(probability),
        is_end_of_utterance: end_of_utterance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_vad_reports_start_then_end() {
        let mut vad = StubVad::default();
        let silent = vec![0.0f32; 512];
        let loud = vec![0.5f32; 512];

        let e0 = vad.feed(&silent).unwrap();
        assert!(e0.is_empty());
        let e1 = vad.feed(&loud).unwrap();
        assert_eq!(e1.start, Some(512));
        let e2 = vad.feed(&silent).unwrap();
        assert_eq!(e2.end, Some(1024));
    }

    #[test]
    fn stub_whole_chunk_asr_is_empty_for_empty_input() {
        let mut asr = StubWholeChunkAsr;
        assert!(asr.transcribe(&[], "en").unwrap().is_empty());
    }

    #[test]
    fn stub_asr_decoder_fires_one_word_per_cadence_then_ends() {
        let mut encoder = StubAsrEncoder;
        let frames = encoder.encode(&vec![0i16; 16_000]).unwrap(); // 1s -> 50 frames
        let mut decoder = StubAsrDecoder::default();

        let (first, attention) = decoder.step(frames.as_ref()).unwrap();
        assert_eq!(first.text, "word0");
        assert!(!first.is_end_of_utterance);
        assert_eq!(attention[0], 1.0);

        let (second, _) = decoder.step(frames.as_ref()).unwrap();
        assert_eq!(second.text, "word1");

        let (third, _) = decoder.step(frames.as_ref()).unwrap();
        assert!(third.is_end_of_utterance);
    }

    #[test]
    fn stub_diarizer_alternates_speakers_every_two_seconds() {
        let mut d = StubDiarizer::default();
        let four_seconds = vec![0i16; 16_000 * 4];
        let intervals = d.feed(&four_seconds, 0.0).unwrap();
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].internal_speaker_id, 0);
    }
}
