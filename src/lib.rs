//! # voxstream
//!
//! Real-time streaming speech transcription pipeline: ingress → decoder →
//! VAD gate → transcriber (AlignAtt or LocalAgreement) → diarizer +
//! translator → aligner → publisher, orchestrated by one `Session` per
//! audio stream.
//!
//! ## Architecture
//!
//! ```text
//! Ingress → Decoder → VAD gate → Transcriber ─┬→ Aligner → Publisher
//!                                    Diarizer ─┤
//!                                   Translator ─┘
//! ```
//!
//! Neural models (ASR, VAD, diarizer, translator) are external
//! collaborators consumed through the narrow traits in `external`; this
//! crate owns only the orchestration, stabilization and post-processing
//! logic around them.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod aligner;
pub mod audio;
pub mod buffering;
pub mod config;
pub mod diarizer;
pub mod error;
pub mod external;
pub mod ingress;
pub mod model;
pub mod publisher;
pub mod session;
pub mod transcriber;
pub mod translator;
pub mod vad;

pub use config::{BackendPolicy, BufferTrimming, SessionConfig, TimeFormat};
pub use error::{Error, Result};
pub use model::{Segment, SessionState, TentativeBuffer, Token};
pub use publisher::{Snapshot, Status};
pub use session::Session;
pub use transcriber::{Transcriber, TranscriberPolicy};
