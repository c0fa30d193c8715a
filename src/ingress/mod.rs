//! Ingress: accepts opaque byte frames for one session and routes them
//! either straight into the PCM path (`pcm_input = true`) or to the
//! Decoder's input port. An empty frame is the end-of-stream sentinel.

use tracing::info;

use crate::audio::decoder::Decoder;
use crate::error::Result;

/// What an ingress frame resolved to.
pub enum IngressOutcome {
    /// PCM ready to hand to the VAD gate.
    Pcm(Vec<i16>),
    /// The frame was opaque and forwarded to the decoder; PCM will arrive
    /// later from `Decoder::read`.
    ForwardedToDecoder,
    /// An empty frame was received: end-of-stream.
    Eof,
}

pub struct Ingress {
    pcm_input: bool,
}

impl Ingress {
    pub fn new(pcm_input: bool) -> Self {
        Self { pcm_input }
    }

    /// Accept one frame. `decoder` is only touched when `pcm_input` is
    /// false.
    pub async fn accept(&self, frame: &[u8], decoder: &mut Decoder) -> Result<IngressOutcome> {
        if frame.is_empty() {
            info!("ingress received EOF sentinel");
            return Ok(IngressOutcome::Eof);
        }

        if self.pcm_input {
            let samples = bytes_to_s16le(frame);
            return Ok(IngressOutcome::Pcm(samples));
        }

        decoder.write(frame).await?;
        Ok(IngressOutcome::ForwardedToDecoder)
    }
}

/// Interpret a byte slice as little-endian 16-bit PCM, dropping a
/// trailing odd byte if present (can only happen on a malformed final
/// frame).
pub fn bytes_to_s16le(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_frame_is_eof() {
        let ingress = Ingress::new(true);
        let mut decoder = Decoder::new("cat", vec![]);
        let outcome = ingress.accept(&[], &mut decoder).await.unwrap();
        assert!(matches!(outcome, IngressOutcome::Eof));
    }

    #[tokio::test]
    async fn pcm_input_frames_are_decoded_directly() {
        let ingress = Ingress::new(true);
        let mut decoder = Decoder::new("cat", vec![]);
        let frame = 1i16.to_le_bytes().to_vec();
        let outcome = ingress.accept(&frame, &mut decoder).await.unwrap();
        match outcome {
            IngressOutcome::Pcm(samples) => assert_eq!(samples, vec![1]),
            _ => panic!("expected Pcm outcome"),
        }
    }

    #[test]
    fn bytes_to_s16le_drops_trailing_odd_byte() {
        let samples = bytes_to_s16le(&[1, 0, 2, 0, 0xFF]);
        assert_eq!(samples, vec![1, 2]);
    }
}
