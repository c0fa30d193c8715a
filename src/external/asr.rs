//! ASR capability interfaces: an incremental encoder/decoder pair for
//! `AlignAtt`, and a whole-chunk transcriber for `LocalAgreement`.

use crate::error::Result;

/// Per-frame encoder output for one audio window. Implementations own the
/// actual tensor; the transcriber only needs shape and indexing.
pub trait EncoderFrames: Send {
    fn frame_count(&self) -> usize;
    /// Seconds spanned by one encoder frame (typically ~20 ms).
    fn time_per_frame(&self) -> f64;
}

/// Encodes raw PCM into frame-aligned representations consumed by
/// `AsrDecoder::step`.
pub trait AsrEncoder: Send {
    /// Encode (or incrementally extend the encoding of) a 16 kHz mono
    /// s16le PCM window.
    fn encode(&mut self, pcm: &[i16]) -> Result<Box<dyn EncoderFrames>>;
}

/// Cross-attention of a decoded token over encoder frames, averaged over
/// the alignment heads set: one weight per encoder frame, summing to ~1.
pub type AttentionOverTime = Vec<f32>;

/// Stateful greedy decoder for `AlignAtt`. `step` is called once per
/// candidate token within a tick.
pub trait AsrDecoder: Send {
    /// Decode the next candidate token id given the current decoder state
    /// and the encoder frames for the active window. Returns the token id
    /// and its averaged cross-attention over encoder frames.
    fn step(&mut self, encoder_frames: &dyn EncoderFrames) -> Result<(TokenCandidate, AttentionOverTime)>;

    /// Clear all decoder state (token history, caches). Called on
    /// AlignAtt failure-recovery and at session start.
    fn reset(&mut self);

    /// Trim any retained cache so that decoding the next token yields the
    /// same logits (to floating-point tolerance) as a full recompute from
    /// `anchor_time` onward.
    fn trim_cache(&mut self, anchor_time: f64);

    /// Set the beam width used by the underlying search. Called once at
    /// construction; a no-op default for decoders that only support
    /// greedy decoding.
    fn set_beam_size(&mut self, _beam_size: u32) {}
}

/// One greedy-decoded candidate token, prior to time-alignment.
#[derive(Debug, Clone)]
pub struct TokenCandidate {
    pub text: String,
    pub probability: Option<f32>,
    /// `true` once the decoder considers the utterance finished (e.g. an
    /// end-of-sequence token was produced).
    pub is_end_of_utterance: bool,
}

/// A single ASR word hypothesis with sample-accurate timing, as returned
/// by `AsrWholeChunkTranscriber::transcribe`.
#[derive(Debug, Clone, PartialEq)]
pub struct WordHyp {
    pub word: String,
    pub start: f64,
    pub end: f64,
    pub probability: Option<f32>,
}

/// Whole-chunk ASR used by `LocalAgreement`: re-transcribes a suffix
/// window from scratch each tick.
pub trait AsrWholeChunkTranscriber: Send {
    fn transcribe(&mut self, pcm: &[i16], language_hint: &str) -> Result<Vec<WordHyp>>;
}
