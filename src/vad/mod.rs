//! VAD gate: turns a continuous 16 kHz PCM stream plus an external `Vad`
//! into a totally ordered sequence of active-audio chunks and silence
//! events, with sample-accurate bookkeeping via a single monotonic
//! counter that is never reset within a session.

pub mod energy;

use crate::error::Result;
use crate::external::vad::{Vad, VadEdge};

/// Windows are fed to the external VAD at this size — 512 samples is
/// ~32 ms at 16 kHz.
pub const WINDOW_SAMPLES: usize = 512;

/// Active audio is flushed downstream once the in-flight piece reaches
/// this many samples, to bound buffering during long utterances.
pub const FLUSH_CHUNK_SAMPLES: usize = 16_000 * 2; // 2s

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Active,
    Silent,
}

/// One gate output event.
#[derive(Debug, Clone, PartialEq)]
pub enum GateEvent {
    /// A bounded piece of contiguous PCM belonging to one voiced region.
    /// `start_sample` is this piece's own start, not necessarily the
    /// region's start.
    ActiveAudio { samples: Vec<i16>, start_sample: u64 },
    /// A finalized span of silence.
    Silence {
        start_sample: u64,
        end_sample: u64,
        duration: f64,
    },
}

/// Runs the `Active`/`Silent` state machine described for the VAD gate.
pub struct VadGate {
    state: GateState,
    /// Total samples fed so far; the basis for `time = samples / 16000`.
    sample_counter: u64,
    /// Start of the current silence span, pending finalization.
    silence_start: u64,
    /// Buffered PCM for the in-flight active piece.
    active_accum: Vec<i16>,
    /// Start sample of the in-flight active piece.
    active_piece_start: u64,
    window_accum_f32: Vec<f32>,
    window_accum_i16: Vec<i16>,
}

impl VadGate {
    pub fn new() -> Self {
        Self {
            state: GateState::Silent,
            sample_counter: 0,
            silence_start: 0,
            active_accum: Vec::new(),
            active_piece_start: 0,
            window_accum_f32: Vec::with_capacity(WINDOW_SAMPLES),
            window_accum_i16: Vec::with_capacity(WINDOW_SAMPLES),
        }
    }

    pub fn sample_time(&self) -> f64 {
        self.sample_counter as f64 / 16_000.0
    }

    /// Feed PCM of arbitrary length; internally chunked into fixed
    /// `WINDOW_SAMPLES` windows for the external VAD, with any remainder
    /// buffered for the next call.
    pub fn feed(&mut self, pcm: &[i16], vad: &mut dyn Vad) -> Result<Vec<GateEvent>> {
        let mut events = Vec::new();
        for &sample in pcm {
            self.window_accum_i16.push(sample);
            self.window_accum_f32.push(sample as f32 / i16::MAX as f32);
            if self.window_accum_f32.len() == WINDOW_SAMPLES {
                self.process_window(vad, &mut events)?;
            }
        }
        Ok(events)
    }

    /// Finalize the final partial window (if any) and whatever active
    /// chunk or silence span is pending, for the end-of-stream drain.
    pub fn flush_at_eof(&mut self, vad: &mut dyn Vad) -> Result<Vec<GateEvent>> {
        let mut events = Vec::new();
        if !self.window_accum_f32.is_empty() {
            self.process_window(vad, &mut events)?;
        }
        match self.state {
            GateState::Active => {
                if !self.active_accum.is_empty() {
                    events.push(GateEvent::ActiveAudio {
                        samples: std::mem::take(&mut self.active_accum),
                        start_sample: self.active_piece_start,
                    });
                }
            }
            GateState::Silent => {
                if self.sample_counter > self.silence_start {
                    events.push(GateEvent::Silence {
                        start_sample: self.silence_start,
                        end_sample: self.sample_counter,
                        duration: (self.sample_counter - self.silence_start) as f64 / 16_000.0,
                    });
                    self.silence_start = self.sample_counter;
                }
            }
        }
        Ok(events)
    }

    fn process_window(&mut self, vad: &mut dyn Vad, events: &mut Vec<GateEvent>) -> Result<()> {
        let window_start = self.sample_counter;
        let edge = vad.feed(&self.window_accum_f32)?;
        let window_pcm = std::mem::take(&mut self.window_accum_i16);
        self.window_accum_f32.clear();
        self.sample_counter += window_pcm.len() as u64;

        self.apply_edge(edge, window_start, window_pcm, events);
        Ok(())
    }

    fn apply_edge(
        &mut self,
        edge: VadEdge,
        window_start: u64,
        window_pcm: Vec<i16>,
        events: &mut Vec<GateEvent>,
    ) {
        match self.state {
            GateState::Silent => {
                if let Some(start) = edge.start {
                    events.push(GateEvent::Silence {
                        start_sample: self.silence_start,
                        end_sample: start,
                        duration: (start.saturating_sub(self.silence_start)) as f64 / 16_000.0,
                    });
                    self.state = GateState::Active;
                    self.active_piece_start = start;
                    self.active_accum.clear();
                    self.active_accum.extend_from_slice(&window_pcm);
                } // edge.end while Silent: spurious, ignored.
            }
            GateState::Active => {
                if let Some(end) = edge.end {
                    self.active_accum.extend_from_slice(&window_pcm);
                    events.push(GateEvent::ActiveAudio {
                        samples: std::mem::take(&mut self.active_accum),
                        start_sample: self.active_piece_start,
                    });
                    self.state = GateState::Silent;
                    self.silence_start = end;
                } else {
                    self.active_accum.extend_from_slice(&window_pcm);
                    if self.active_accum.len() >= FLUSH_CHUNK_SAMPLES {
                        let start = self.active_piece_start;
                        events.push(GateEvent::ActiveAudio {
                            samples: std::mem::take(&mut self.active_accum),
                            start_sample: start,
                        });
                        self.active_piece_start = window_start + window_pcm.len() as u64;
                    }
                } // edge.start while Active: spurious, ignored.
            }
        }
    }
}

impl Default for VadGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::stub::StubVad;

    fn window(amplitude: i16) -> Vec<i16> {
        vec![amplitude; WINDOW_SAMPLES]
    }

    #[test]
    fn silence_then_speech_emits_silence_then_active() {
        let mut gate = VadGate::new();
        let mut vad = StubVad::default();

        let events = gate.feed(&window(0), &mut vad).unwrap();
        assert!(events.is_empty(), "no edge yet, nothing finalized");

        let events = gate.feed(&window(8_000), &mut vad).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            GateEvent::Silence {
                start_sample,
                end_sample,
                ..
            } => {
                assert_eq!(*start_sample, 0);
                assert_eq!(*end_sample, WINDOW_SAMPLES as u64);
            }
            other => panic!("expected Silence, got {other:?}"),
        }
    }

    #[test]
    fn active_region_flushes_active_audio_on_voice_end() {
        let mut gate = VadGate::new();
        let mut vad = StubVad::default();

        gate.feed(&window(0), &mut vad).unwrap();
        gate.feed(&window(8_000), &mut vad).unwrap(); // start voice
        let events = gate.feed(&window(0), &mut vad).unwrap(); // end voice
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], GateEvent::ActiveAudio { .. }));
    }

    #[test]
    fn eof_flush_finalizes_trailing_silence() {
        let mut gate = VadGate::new();
        let mut vad = StubVad::default();
        gate.feed(&window(0), &mut vad).unwrap();
        let events = gate.flush_at_eof(&mut vad).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], GateEvent::Silence { .. }));
    }

    #[test]
    fn sample_counter_is_monotonic_and_never_reset() {
        let mut gate = VadGate::new();
        let mut vad = StubVad::default();
        for _ in 0..5 {
            gate.feed(&window(0), &mut vad).unwrap();
        }
        assert_eq!(gate.sample_counter, WINDOW_SAMPLES as u64 * 5);
    }
}
