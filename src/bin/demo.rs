//! Demo binary: runs the pipeline against a recorded WAV file with stub
//! external models and prints the final transcript snapshot as JSON.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use voxstream::audio::resample::RateConverter;
use voxstream::buffering::chunk::AudioChunk;
use voxstream::external::stub::{
    StubAsrDecoder, StubAsrEncoder, StubDiarizer, StubTranslator, StubVad, StubWholeChunkAsr,
};
use voxstream::{BackendPolicy, Session, SessionConfig, TranscriberPolicy};

struct Args {
    wav: PathBuf,
    diarization: bool,
    translation: bool,
    target_language: String,
    backend_policy: BackendPolicy,
}

fn parse_args() -> Result<Args> {
    let mut wav = None;
    let mut diarization = false;
    let mut translation = false;
    let mut target_language = String::new();
    let mut backend_policy = SessionConfig::default().backend_policy;

    let mut it = std::env::args().skip(1).peekable();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--wav" => {
                let v = it.next().context("missing value for --wav")?;
                wav = Some(PathBuf::from(v));
            }
            "--diarization" => diarization = true,
            "--translation" => {
                translation = true;
                target_language = it.next().context("missing value for --translation")?;
            }
            "--backend" => {
                let v = it.next().context("missing value for --backend")?;
                backend_policy = match v.as_str() {
                    "align_att" => BackendPolicy::AlignAtt,
                    "local_agreement" => BackendPolicy::LocalAgreement,
                    other => bail!("unknown --backend {other} (expected align_att or local_agreement)"),
                };
            }
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run --bin demo -- --wav <file.wav> [--diarization] \
                     [--translation <lang>] [--backend align_att|local_agreement]"
                );
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    Ok(Args {
        wav: wav.context("--wav <file.wav> is required")?,
        diarization,
        translation,
        target_language,
        backend_policy,
    })
}

/// Reads a WAV file as mono f32 samples at its native rate, downmixing any
/// multi-channel input by averaging.
fn read_wav_mono_f32(path: &PathBuf) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path).with_context(|| format!("opening {path:?}"))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .context("reading float samples")?,
        hound::SampleFormat::Int => {
            if spec.bits_per_sample <= 16 {
                reader
                    .samples::<i16>()
                    .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
                    .collect::<Result<Vec<_>, _>>()
                    .context("reading int16 samples")?
            } else {
                let max = ((1_i64 << (spec.bits_per_sample - 1)) - 1) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max))
                    .collect::<Result<Vec<_>, _>>()
                    .context("reading int32 samples")?
            }
        }
    };

    if channels == 1 {
        return Ok((interleaved, spec.sample_rate));
    }
    let mut mono = Vec::with_capacity(interleaved.len() / channels);
    for frame in interleaved.chunks(channels) {
        mono.push(frame.iter().copied().sum::<f32>() / channels as f32);
    }
    Ok((mono, spec.sample_rate))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = parse_args()?;
    let (samples, native_rate) = read_wav_mono_f32(&args.wav)?;
    tracing::info!(file = ?args.wav, native_rate, frames = samples.len(), "loaded fixture");

    let mut rate_converter = RateConverter::new(native_rate, 16_000, 960)
        .context("initializing resampler to 16kHz")?;
    let chunk_16k = AudioChunk::new(rate_converter.process(&samples), 16_000);
    let pcm = chunk_16k.to_s16le_pcm();

    let config = SessionConfig {
        pcm_input: true,
        diarization: args.diarization,
        translation: args.translation,
        target_language: args.target_language.clone(),
        backend_policy: args.backend_policy,
        ..SessionConfig::default()
    };

    let transcriber = TranscriberPolicy::from_config(
        &config,
        Box::new(StubAsrEncoder),
        Box::new(StubAsrDecoder::default()),
        Box::new(StubWholeChunkAsr),
    );

    let mut session = Session::new(
        config.clone(),
        "cat",
        vec![],
        Box::new(StubVad::default()),
        transcriber,
        if args.diarization {
            Some(Box::new(StubDiarizer::default()))
        } else {
            None
        },
        if args.translation {
            Some(Box::new(StubTranslator))
        } else {
            None
        },
    );

    let publish_interval = session.publish_interval();
    let mut next_publish = tokio::time::Instant::now() + publish_interval;

    const FEED_CHUNK_SAMPLES: usize = 3_200; // 200ms at 16kHz, one read-cycle's worth
    for chunk in pcm.chunks(FEED_CHUNK_SAMPLES) {
        let mut bytes = Vec::with_capacity(chunk.len() * 2);
        for s in chunk {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        session.ingest(&bytes).await?;
        if tokio::time::Instant::now() >= next_publish {
            if let Some(snapshot) = session.publish_tick() {
                tracing::debug!(status = ?snapshot.status, lines = snapshot.lines.len(), "tick");
            }
            next_publish += publish_interval;
        }
    }
    session.ingest(&[]).await?;
    let final_snapshot = session.drain().await;

    println!("{}", serde_json::to_string_pretty(&final_snapshot)?);
    Ok(())
}
