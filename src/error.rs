use thiserror::Error;

/// All errors produced by the pipeline.
///
/// Variants map directly onto the recovery policy documented per stage:
/// `Decoder*`/`VadFailure` are fatal or escalate after a retry budget,
/// `Asr*` degrade a single tick, `DiarizerFailure`/`TranslatorFailure`
/// degrade the whole session without ending it, and `Backpressure` is
/// surfaced to the ingress caller rather than the session.
#[derive(Debug, Error)]
pub enum Error {
    /// The decoder child process could not be spawned at all.
    #[error("decoder process missing or unspawnable: {0}")]
    DecoderMissing(String),

    /// The decoder child died or its pipe failed while `Running`.
    #[error("decoder crashed (attempt {attempt}/{max_attempts}): {detail}")]
    DecoderCrash {
        attempt: u32,
        max_attempts: u32,
        detail: String,
    },

    /// The voice-activity detector itself failed. Treated as fatal — unlike
    /// ASR, there is no fallback decision to trust instead.
    #[error("voice activity detector failed: {0}")]
    VadFailure(String),

    /// A single ASR tick failed; the tick is skipped, no state is mutated.
    #[error("transient ASR failure: {0}")]
    AsrTransient(String),

    /// `N` consecutive `AsrTransient` failures; the session is terminated.
    #[error("persistent ASR failure after {streak} consecutive ticks: {detail}")]
    AsrPersistent { streak: u32, detail: String },

    /// Diarizer failed; the session continues with unassigned speakers.
    #[error("diarizer failed, degrading to unassigned speakers: {0}")]
    DiarizerFailure(String),

    /// Translator failed; translation is disabled for the remainder of
    /// the session.
    #[error("translator failed, disabling translation: {0}")]
    TranslatorFailure(String),

    /// A write was rejected at ingress because a downstream queue is
    /// saturated.
    #[error("backpressure: {0}")]
    Backpressure(String),

    /// Audio device or stream errors from a local microphone source.
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("session is already running")]
    AlreadyRunning,

    #[error("session is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// The stable error-kind identifier surfaced in a `status = error`
    /// snapshot, independent of the human-readable message.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::DecoderMissing(_) => "decoder_missing",
            Error::DecoderCrash { .. } => "decoder_crash",
            Error::VadFailure(_) => "vad_failure",
            Error::AsrTransient(_) => "asr_transient",
            Error::AsrPersistent { .. } => "asr_persistent",
            Error::DiarizerFailure(_) => "diarizer_failure",
            Error::TranslatorFailure(_) => "translator_failure",
            Error::Backpressure(_) => "backpressure",
            Error::AudioDevice(_) => "audio_device",
            Error::AudioStream(_) => "audio_stream",
            Error::NoDefaultInputDevice => "no_default_input_device",
            Error::AlreadyRunning => "already_running",
            Error::NotRunning => "not_running",
            Error::Io(_) => "io",
            Error::Other(_) => "other",
        }
    }

    /// Whether this error kind is fatal to the session (per the recovery
    /// policy), as opposed to a per-tick or degraded-mode condition.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::DecoderMissing(_) | Error::VadFailure(_) | Error::AsrPersistent { .. } => true,
            Error::DecoderCrash {
                attempt,
                max_attempts,
                ..
            } => attempt >= max_attempts,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
