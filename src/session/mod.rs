//! Session: the lifecycle orchestrator. Owns one pipeline instance end to
//! end — Ingress, Decoder, VAD gate, Transcriber, Diarizer, Translator,
//! Aligner, Publisher — and is the single writer of `SessionState`.
//!
//! Model calls (`Transcriber::tick`, `Diarizer::feed`, `Translator::feed`)
//! are CPU-bound and, in a multi-session deployment, belong on a worker
//! pool reached via `spawn_blocking`; this single-session orchestrator
//! calls them inline since it already is that worker — the call sites are
//! exactly where a production `async fn` wrapper would insert the offload.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::aligner::Aligner;
use crate::audio::decoder::Decoder;
use crate::config::SessionConfig;
use crate::diarizer::Diarizer;
use crate::error::{Error, Result};
use crate::external::diarizer::Diarizer as DiarizerModel;
use crate::external::translator::Translator as TranslatorModel;
use crate::external::vad::Vad;
use crate::ingress::{Ingress, IngressOutcome};
use crate::model::{SessionState, Token};
use crate::publisher::{Publisher, Snapshot, Status};
use crate::transcriber::{Transcriber, TranscriberPolicy};
use crate::translator::Translator;
use crate::vad::{GateEvent, VadGate};

/// Deadline for the end-of-stream drain; if exceeded, remaining stages are
/// force-cancelled and the Publisher still emits a final snapshot with
/// whatever state is present.
pub const DRAIN_DEADLINE: Duration = Duration::from_secs(10);
const DECODER_READ_CHUNK: usize = 65_536;
const DECODER_READ_TIMEOUT: Duration = Duration::from_millis(200);
/// Consecutive empty decoder reads treated as "drained" during shutdown.
const DRAIN_EMPTY_READS: u32 = 3;
/// Snapshot broadcast channel capacity — generous enough that a subscriber
/// briefly lagging behind the ~20 Hz publish cadence doesn't miss a beat.
const SNAPSHOT_CHANNEL_CAPACITY: usize = 32;

pub struct Session {
    config: SessionConfig,
    state: SessionState,
    ingress: Ingress,
    decoder: Decoder,
    vad_gate: VadGate,
    vad: Box<dyn Vad>,
    transcriber: TranscriberPolicy,
    diarizer: Option<Diarizer>,
    translator: Option<Translator>,
    aligner: Aligner,
    publisher: Publisher,
    fatal: Option<Error>,
    eof_seen: bool,
    snapshot_tx: broadcast::Sender<Snapshot>,
    ready_to_stop_tx: broadcast::Sender<()>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SessionConfig,
        decoder_program: impl Into<String>,
        decoder_args: Vec<String>,
        vad: Box<dyn Vad>,
        transcriber: TranscriberPolicy,
        diarizer_model: Option<Box<dyn DiarizerModel>>,
        translator_model: Option<Box<dyn TranslatorModel>>,
    ) -> Self {
        let diarization = config.diarization;
        let translation = config.translation;
        let language = config.language.clone();
        let target_language = config.target_language.clone();
        let pcm_input = config.pcm_input;
        let (snapshot_tx, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        let (ready_to_stop_tx, _) = broadcast::channel(1);
        Self {
            snapshot_tx,
            ready_to_stop_tx,
            aligner: Aligner::new(diarization),
            translator: if translation {
                translator_model.map(|m| Translator::new(m, language, target_language))
            } else {
                None
            },
            diarizer: if diarization {
                diarizer_model.map(Diarizer::new)
            } else {
                None
            },
            ingress: Ingress::new(pcm_input),
            decoder: Decoder::new(decoder_program, decoder_args),
            vad_gate: VadGate::new(),
            vad,
            transcriber,
            publisher: Publisher::new(),
            state: SessionState::new(),
            config,
            fatal: None,
            eof_seen: false,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Subscribe to the snapshot broadcast stream published on each
    /// `publish_tick()`.
    pub fn subscribe(&self) -> broadcast::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Subscribe to the terminal `ready_to_stop` control event.
    pub fn subscribe_ready_to_stop(&self) -> broadcast::Receiver<()> {
        self.ready_to_stop_tx.subscribe()
    }

    /// The interval a caller should wait between `publish_tick()` calls to
    /// honor `config.publish_hz`. Publish cadence is owned by the caller,
    /// not an internal timer, so this is advisory: callers driving their
    /// own loop (e.g. the demo binary) read it once at startup.
    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.config.publish_hz.max(0.1))
    }

    /// Start the decoder child if this session is not PCM-input.
    pub async fn start(&mut self) -> Result<()> {
        if !self.config.pcm_input {
            self.decoder.start().await?;
        }
        Ok(())
    }

    fn ingress_time(&self) -> f64 {
        self.vad_gate.sample_time()
    }

    /// Integrate one gate event into session state: insert audio / silence
    /// into the transcriber, feed the diarizer, tick, and fold the results
    /// into `SessionState`'s delta buffers.
    fn handle_gate_event(&mut self, event: GateEvent) -> Result<()> {
        match event {
            GateEvent::ActiveAudio { samples, start_sample } => {
                let stream_time = start_sample as f64 / 16_000.0;

                if let Some(diarizer) = self.diarizer.as_mut() {
                    match diarizer.feed(&samples, stream_time) {
                        Ok(intervals) => {
                            self.state.new_speaker_intervals.extend(intervals);
                            self.state.end_of_diarized_audio = diarizer.end_of_diarized_audio();
                        }
                        Err(e) => warn!("diarizer feed failed: {e}"),
                    }
                }

                self.transcriber.insert_audio(&samples, stream_time);
                self.run_transcriber_tick()?;
            }
            GateEvent::Silence { start_sample, end_sample, duration } => {
                self.transcriber.start_silence();
                self.run_transcriber_tick()?;
                self.transcriber.end_silence(duration);

                let start = start_sample as f64 / 16_000.0;
                let end = end_sample as f64 / 16_000.0;
                let silence = Token::silence_marker(start, end);
                self.state.end_of_committed_audio = self.state.end_of_committed_audio.max(end);
                self.state.new_tokens.push(silence);
            }
        }
        Ok(())
    }

    fn run_transcriber_tick(&mut self) -> Result<()> {
        match self.transcriber.tick() {
            Ok(out) => {
                self.state.end_of_committed_audio =
                    self.state.end_of_committed_audio.max(out.new_end_of_committed_audio);
                let ingress_time = self.ingress_time();
                if let Some(translator) = self.translator.as_mut() {
                    match translator.feed(&out.new_committed_tokens, ingress_time) {
                        Ok(translations) => self.state.new_translations.extend(translations),
                        Err(e) => {
                            warn!("translator failed, degrading: {e}");
                            translator.degrade();
                        }
                    }
                }
                self.state.new_tokens.extend(out.new_committed_tokens);
                Ok(())
            }
            Err(e) if e.is_fatal() => {
                error!("transcriber tick failed fatally: {e}");
                let kind_msg = e.to_string();
                self.fatal = Some(e);
                Err(Error::AsrPersistent { streak: 0, detail: kind_msg })
            }
            Err(e) => {
                warn!("transcriber tick failed, continuing: {e}");
                Ok(())
            }
        }
    }

    async fn feed_pcm(&mut self, samples: Vec<i16>) -> Result<()> {
        let vad = self.vad.as_mut();
        let events = self.vad_gate.feed(&samples, vad).map_err(|e| {
            error!("vad failure, fatal: {e}");
            e
        })?;
        for event in events {
            self.handle_gate_event(event)?;
        }
        Ok(())
    }

    /// Accept one ingress frame. An empty frame triggers the full drain
    /// protocol and returns the terminal snapshot plus `ready_to_stop`.
    pub async fn ingest(&mut self, frame: &[u8]) -> Result<()> {
        if self.publisher.is_finalized() {
            return Ok(());
        }
        let outcome = self.ingress.accept(frame, &mut self.decoder).await?;
        match outcome {
            IngressOutcome::Eof => {
                self.eof_seen = true;
            }
            IngressOutcome::Pcm(samples) => {
                self.feed_pcm(samples).await?;
            }
            IngressOutcome::ForwardedToDecoder => {
                self.decoder.drain_stderr().await;
                match self.decoder.read(DECODER_READ_CHUNK, DECODER_READ_TIMEOUT).await {
                    Ok(bytes) => {
                        if !bytes.is_empty() {
                            let samples = crate::ingress::bytes_to_s16le(&bytes);
                            self.feed_pcm(samples).await?;
                        }
                    }
                    Err(e) if e.is_fatal() => {
                        error!("decoder read failed fatally: {e}");
                        let (attempt, max_attempts) = match &e {
                            Error::DecoderCrash { attempt, max_attempts, .. } => (*attempt, *max_attempts),
                            _ => (0, 0),
                        };
                        let detail = e.to_string();
                        self.fatal = Some(e);
                        return Err(Error::DecoderCrash { attempt, max_attempts, detail });
                    }
                    Err(e) => {
                        warn!("decoder read failed, continuing after restart: {e}");
                    }
                }
            }
        }
        Ok(())
    }

    /// One Aligner + Publisher pass, driven by the session's own ~20 Hz
    /// timer (not by ingress arrival).
    pub fn publish_tick(&mut self) -> Option<Snapshot> {
        if self.publisher.is_finalized() {
            return None;
        }
        let ingress_time = self.ingress_time();
        let (new_tokens, new_speaker_intervals, new_translations) = self.state.take_deltas();
        let translation_buffer = self
            .translator
            .as_ref()
            .map(|t| t.translation_buffer().to_string())
            .unwrap_or_default();

        let output = self.aligner.tick(
            new_tokens,
            new_speaker_intervals,
            new_translations,
            self.state.end_of_diarized_audio,
            self.transcriber.tentative().clone(),
            String::new(),
            translation_buffer,
            ingress_time,
            self.state.end_of_committed_audio,
            self.state.end_of_diarized_audio,
        );

        let status = if self.fatal.is_some() {
            Status::Error
        } else if ingress_time == 0.0 && output.segments.is_empty() {
            Status::NoAudio
        } else {
            Status::Active
        };
        let error_kind = self.fatal.as_ref().map(|e| e.kind().to_string());
        let snapshot = self.publisher.tick(&output, status, error_kind)?;
        let _ = self.snapshot_tx.send(snapshot.clone());
        Some(snapshot)
    }

    /// Run the end-of-stream drain: finish reading any buffered decoder
    /// output, flush the VAD gate's trailing state, and emit the terminal
    /// snapshot. Bounded by `DRAIN_DEADLINE`.
    pub async fn drain(&mut self) -> Snapshot {
        let deadline = tokio::time::Instant::now() + DRAIN_DEADLINE;
        if !self.config.pcm_input {
            let mut empty_reads = 0;
            while tokio::time::Instant::now() < deadline && empty_reads < DRAIN_EMPTY_READS {
                match self.decoder.read(DECODER_READ_CHUNK, DECODER_READ_TIMEOUT).await {
                    Ok(bytes) if bytes.is_empty() => empty_reads += 1,
                    Ok(bytes) => {
                        empty_reads = 0;
                        let samples = crate::ingress::bytes_to_s16le(&bytes);
                        if self.feed_pcm(samples).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            self.decoder.stop().await;
        }

        let vad = self.vad.as_mut();
        if let Ok(events) = self.vad_gate.flush_at_eof(vad) {
            for event in events {
                let _ = self.handle_gate_event(event);
            }
        }

        let ingress_time = self.ingress_time();
        let (new_tokens, new_speaker_intervals, new_translations) = self.state.take_deltas();
        let translation_buffer = self
            .translator
            .as_ref()
            .map(|t| t.translation_buffer().to_string())
            .unwrap_or_default();
        let output = self.aligner.tick(
            new_tokens,
            new_speaker_intervals,
            new_translations,
            self.state.end_of_diarized_audio,
            self.transcriber.tentative().clone(),
            String::new(),
            translation_buffer,
            ingress_time,
            self.state.end_of_committed_audio,
            self.state.end_of_diarized_audio,
        );
        let error_kind = self.fatal.as_ref().map(|e| e.kind().to_string());
        info!(ingress_time, "session drained, emitting final snapshot");
        let snapshot = self.publisher.finalize(&output, error_kind);
        let _ = self.snapshot_tx.send(snapshot.clone());
        let _ = self.ready_to_stop_tx.send(());
        snapshot
    }

    pub fn is_eof(&self) -> bool {
        self.eof_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::stub::{StubDiarizer, StubTranslator, StubVad, StubWholeChunkAsr};
    use crate::transcriber::local_agreement::LocalAgreementTranscriber;

    fn local_agreement_session(diarization: bool, translation: bool) -> Session {
        let config = SessionConfig {
            pcm_input: true,
            diarization,
            translation,
            ..SessionConfig::default()
        };
        let transcriber = TranscriberPolicy::LocalAgreement(LocalAgreementTranscriber::new(
            Box::new(StubWholeChunkAsr),
            "en",
        ));
        Session::new(
            config,
            "cat",
            vec![],
            Box::new(StubVad::default()),
            transcriber,
            if diarization { Some(Box::new(StubDiarizer::default())) } else { None },
            if translation { Some(Box::new(StubTranslator)) } else { None },
        )
    }

    #[tokio::test]
    async fn zero_byte_input_then_eof_drains_to_no_audio() {
        let mut session = local_agreement_session(false, false);
        session.ingest(&[]).await.unwrap();
        assert!(session.is_eof());
        let snapshot = session.drain().await;
        assert_eq!(snapshot.status, Status::Finalized);
        assert!(session.publisher.is_finalized());
    }

    #[tokio::test]
    async fn publish_after_finalize_emits_nothing() {
        let mut session = local_agreement_session(false, false);
        session.ingest(&[]).await.unwrap();
        session.drain().await;
        assert!(session.publish_tick().is_none());
    }

    #[tokio::test]
    async fn pcm_input_feeds_through_to_committed_tokens() {
        let mut session = local_agreement_session(false, false);
        let loud = vec![8_000i16; 16_000 * 2]; // 2s of "voice" for the StubVad
        let mut bytes = Vec::new();
        for s in &loud {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        session.ingest(&bytes).await.unwrap();
        session.ingest(&[]).await.unwrap();
        let snapshot = session.drain().await;
        assert_eq!(snapshot.status, Status::Finalized);
    }

    #[tokio::test]
    async fn drain_broadcasts_final_snapshot_and_ready_to_stop() {
        let mut session = local_agreement_session(false, false);
        let mut snapshots = session.subscribe();
        let mut ready = session.subscribe_ready_to_stop();

        session.ingest(&[]).await.unwrap();
        session.drain().await;

        let last = snapshots.recv().await.unwrap();
        assert_eq!(last.status, Status::Finalized);
        ready.recv().await.unwrap();
    }
}
