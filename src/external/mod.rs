//! Narrow capability interfaces over the neural models the pipeline
//! consumes (ASR encoder/decoder, whole-chunk ASR, VAD, diarizer,
//! translator). Definitions only — concrete models are provided by the
//! embedder, matching how the pipeline treats them as externally-owned,
//! possibly-shared handles rather than something it constructs.
//!
//! A handle that is documented as non-reentrant is wrapped in
//! `Arc<parking_lot::Mutex<dyn Trait>>`; this is the same
//! shared-mutable-handle shape the engine used for its speech model, just
//! generalized over the six trait boundaries below.

pub mod asr;
pub mod diarizer;
pub mod stub;
pub mod translator;
pub mod vad;

pub use asr::{AsrDecoder, AsrEncoder, AsrWholeChunkTranscriber, EncoderFrames, WordHyp};
pub use diarizer::{Diarizer, RawSpeakerInterval};
pub use translator::Translator;
pub use vad::{Vad, VadEdge};
