//! Energy-based `Vad`: RMS threshold over a 512-sample window, with a
//! hangover counter so a few quiet windows after loud speech don't
//! immediately report `end`.

use crate::error::Result;
use crate::external::vad::{Vad, VadEdge};

/// A simple energy-based voice activity detector.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    /// RMS amplitude threshold (samples normalized to [-1, 1]). Frames
    /// above this are considered speech. Typical range: 0.01-0.05.
    threshold: f32,
    /// How many consecutive below-threshold windows to still report as
    /// speech after real speech ends.
    hangover_frames: u32,
    hangover_counter: u32,
    was_voiced: bool,
}

impl EnergyVad {
    /// # Parameters
    /// - `threshold`: RMS level above which a window is considered speech.
    ///   Default: `0.02`.
    /// - `hangover_frames`: number of silent windows to extend speech
    ///   detection. Default: `8` (~256 ms at 32 ms/window).
    pub fn new(threshold: f32, hangover_frames: u32) -> Self {
        Self {
            threshold,
            hangover_frames,
            hangover_counter: 0,
            was_voiced: false,
        }
    }

    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(0.02, 8)
    }
}

impl Vad for EnergyVad {
    fn feed(&mut self, samples_512: &[f32]) -> Result<VadEdge> {
        let rms = Self::rms(samples_512);
        let voiced = if rms >= self.threshold {
            self.hangover_counter = self.hangover_frames;
            true
        } else if self.hangover_counter > 0 {
            self.hangover_counter -= 1;
            true
        } else {
            false
        };

        let edge = match (self.was_voiced, voiced) {
            (false, true) => VadEdge {
                start: Some(0),
                end: None,
            },
            (true, false) => VadEdge {
                start: None,
                end: Some(0),
            },
            _ => VadEdge::default(),
        };
        self.was_voiced = voiced;
        Ok(edge)
    }

    fn reset(&mut self) {
        self.hangover_counter = 0;
        self.was_voiced = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent() -> Vec<f32> {
        vec![0.0; 512]
    }

    fn loud(amplitude: f32) -> Vec<f32> {
        vec![amplitude; 512]
    }

    #[test]
    fn reports_no_edge_while_staying_silent() {
        let mut vad = EnergyVad::new(0.02, 0);
        let edge = vad.feed(&silent()).unwrap();
        assert!(edge.is_empty());
    }

    #[test]
    fn reports_start_then_end_around_a_loud_window() {
        let mut vad = EnergyVad::new(0.02, 0);
        let e0 = vad.feed(&silent()).unwrap();
        assert!(e0.is_empty());
        let e1 = vad.feed(&loud(0.5)).unwrap();
        assert!(e1.start.is_some());
        let e2 = vad.feed(&silent()).unwrap();
        assert!(e2.end.is_some());
    }

    #[test]
    fn hangover_delays_end_edge() {
        let mut vad = EnergyVad::new(0.02, 2);
        vad.feed(&loud(0.5)).unwrap();
        let during_hangover = vad.feed(&silent()).unwrap();
        assert!(during_hangover.is_empty(), "still within hangover window");
        vad.feed(&silent()).unwrap();
        let after_hangover = vad.feed(&silent()).unwrap();
        assert!(after_hangover.end.is_some());
    }

    #[test]
    fn reset_clears_hangover_and_voiced_state() {
        let mut vad = EnergyVad::new(0.02, 5);
        vad.feed(&loud(0.5)).unwrap();
        vad.reset();
        let edge = vad.feed(&silent()).unwrap();
        assert!(edge.is_empty(), "no end edge — reset forgot we were voiced");
    }

    #[test]
    fn rms_of_square_wave_is_its_amplitude() {
        let samples: Vec<f32> = (0..256)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let rms = EnergyVad::rms(&samples);
        assert!((rms - 0.5).abs() < 1e-5, "rms={rms}");
    }
}
