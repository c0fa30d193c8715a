//! Voice-activity capability interface consumed by the VAD gate.

/// A voice boundary reported by `Vad::feed` for the window just fed.
/// Both fields are sample indices relative to the session's monotonic
/// sample counter; either, both, or neither may be set for a given
/// window (voice can start and end within the same 512-sample window).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VadEdge {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl VadEdge {
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Runs on fixed 512-sample (~32 ms at 16 kHz) windows of 16 kHz mono
/// PCM, reporting voice start/end edges. Trusted by the core — unlike
/// ASR, a VAD failure is fatal rather than degraded.
pub trait Vad: Send {
    /// Feed exactly one 512-sample window (fewer samples only for the
    /// final, end-of-stream window) and report any edges within it.
    fn feed(&mut self, samples_512: &[f32]) -> crate::error::Result<VadEdge>;

    fn reset(&mut self);
}
