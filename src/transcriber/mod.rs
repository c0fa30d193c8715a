//! The stabilization layer over the underlying ASR: decides *when*
//! tentative output is promoted to committed output. Two policies
//! (`AlignAtt`, `LocalAgreement`) implement one contract; per the design
//! notes this is a tagged sum, not a class hierarchy, since exactly one
//! policy is selected per session and there is no need for dynamic
//! dispatch across them.

pub mod align_att;
pub mod local_agreement;

use crate::config::{BackendPolicy, SessionConfig};
use crate::error::Result;
use crate::external::asr::{AsrDecoder, AsrEncoder, AsrWholeChunkTranscriber};
use crate::model::{TentativeBuffer, Token};

/// Output of one `tick()`: tokens newly promoted to committed, and the
/// transcriber's current view of how far committed audio extends.
#[derive(Debug, Clone, Default)]
pub struct TickOutput {
    pub new_committed_tokens: Vec<Token>,
    pub new_end_of_committed_audio: f64,
}

/// Contract implemented by both stabilization policies.
pub trait Transcriber: Send {
    fn insert_audio(&mut self, chunk: &[i16], stream_time: f64);
    fn start_silence(&mut self);
    fn end_silence(&mut self, duration: f64);
    fn tick(&mut self) -> Result<TickOutput>;
    fn tentative(&self) -> &TentativeBuffer;
}

/// A tagged sum over the two policies, selected once at session start per
/// `SessionConfig::backend_policy`.
pub enum TranscriberPolicy {
    AlignAtt(align_att::AlignAttTranscriber),
    LocalAgreement(local_agreement::LocalAgreementTranscriber),
}

impl Transcriber for TranscriberPolicy {
    fn insert_audio(&mut self, chunk: &[i16], stream_time: f64) {
        match self {
            TranscriberPolicy::AlignAtt(t) => t.insert_audio(chunk, stream_time),
            TranscriberPolicy::LocalAgreement(t) => t.insert_audio(chunk, stream_time),
        }
    }

    fn start_silence(&mut self) {
        match self {
            TranscriberPolicy::AlignAtt(t) => t.start_silence(),
            TranscriberPolicy::LocalAgreement(t) => t.start_silence(),
        }
    }

    fn end_silence(&mut self, duration: f64) {
        match self {
            TranscriberPolicy::AlignAtt(t) => t.end_silence(duration),
            TranscriberPolicy::LocalAgreement(t) => t.end_silence(duration),
        }
    }

    fn tick(&mut self) -> Result<TickOutput> {
        match self {
            TranscriberPolicy::AlignAtt(t) => t.tick(),
            TranscriberPolicy::LocalAgreement(t) => t.tick(),
        }
    }

    fn tentative(&self) -> &TentativeBuffer {
        match self {
            TranscriberPolicy::AlignAtt(t) => t.tentative(),
            TranscriberPolicy::LocalAgreement(t) => t.tentative(),
        }
    }
}

impl TranscriberPolicy {
    /// Build the policy named by `config.backend_policy`, threading its
    /// tuning fields through to whichever concrete transcriber is
    /// selected. `encoder`/`decoder` feed `AlignAtt`; `whole_chunk_asr`
    /// feeds `LocalAgreement`. Only the pair the chosen policy needs is
    /// used; the other is dropped.
    pub fn from_config(
        config: &SessionConfig,
        encoder: Box<dyn AsrEncoder>,
        decoder: Box<dyn AsrDecoder>,
        whole_chunk_asr: Box<dyn AsrWholeChunkTranscriber>,
    ) -> Self {
        match config.backend_policy {
            BackendPolicy::AlignAtt => TranscriberPolicy::AlignAtt(
                align_att::AlignAttTranscriber::new(
                    encoder,
                    decoder,
                    config.frame_threshold,
                    config.fire_threshold,
                )
                .with_beam_size(config.beam_size),
            ),
            BackendPolicy::LocalAgreement => TranscriberPolicy::LocalAgreement(
                local_agreement::LocalAgreementTranscriber::new(
                    whole_chunk_asr,
                    config.language.clone(),
                )
                .with_buffer_trimming(config.buffer_trimming),
            ),
        }
    }
}

/// Light hypothesis-word text normalization shared by `LocalAgreement`'s
/// LCP match: case-insensitive, surrounding punctuation stripped.
pub fn normalize_word(word: &str) -> String {
    word.trim_matches(|c: char| c.is_ascii_punctuation())
        .to_lowercase()
}
