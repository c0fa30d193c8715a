//! Decoder: a supervised child process converting arbitrary compressed
//! audio into 16 kHz mono s16le PCM, following the piped-stdin/
//! stdout-plus-drained-stderr pattern used for realtime audio
//! transcoding elsewhere in this codebase.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::{Error, Result};

const DEFAULT_MAX_RESTARTS: u32 = 3;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(250);

/// `Stopped -> Starting -> Running -> (Restarting | Failed) -> Stopped`.
/// Transitions are guarded by `&mut self` — the decoder is owned by a
/// single session task, so no additional lock is needed beyond normal
/// Rust aliasing rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Stopped,
    Starting,
    Running,
    Restarting,
    Failed,
}

/// Spawns and supervises the decode+resample child process.
pub struct Decoder {
    program: String,
    args: Vec<String>,
    state: DecoderState,
    child: Option<Child>,
    restart_attempt: u32,
    max_restarts: u32,
}

impl Decoder {
    /// `program`/`args` name the external decoder binary (e.g. ffmpeg);
    /// the concrete codec set accepted is opaque to this type.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            state: DecoderState::Stopped,
            child: None,
            restart_attempt: 0,
            max_restarts: DEFAULT_MAX_RESTARTS,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    fn transition(&mut self, to: DecoderState) {
        info!(from = ?self.state, to = ?to, "decoder state transition");
        self.state = to;
    }

    /// Spawn the child process. Only valid from `Stopped`.
    pub async fn start(&mut self) -> Result<()> {
        self.transition(DecoderState::Starting);
        match self.spawn().await {
            Ok(child) => {
                self.child = Some(child);
                self.restart_attempt = 0;
                self.transition(DecoderState::Running);
                Ok(())
            }
            Err(e) => {
                self.transition(DecoderState::Failed);
                Err(Error::DecoderMissing(e.to_string()))
            }
        }
    }

    async fn spawn(&self) -> std::io::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }

    /// Non-blocking from the caller's view: fails only if not `Running`.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.state != DecoderState::Running {
            return Err(Error::Backpressure(
                "decoder not running, write rejected".into(),
            ));
        }
        let result = {
            let child = self
                .child
                .as_mut()
                .expect("Running state implies a spawned child");
            let stdin = child
                .stdin
                .as_mut()
                .expect("piped stdin is always present while Running");
            stdin.write_all(bytes).await
        };
        if let Err(e) = result {
            self.handle_failure(e.to_string()).await?;
        }
        Ok(())
    }

    /// Read up to `max_bytes` of PCM, or time out.
    ///
    /// A timeout while active voice input is in flight is a warning, not
    /// fatal — the caller decides whether to retry.
    pub async fn read(&mut self, max_bytes: usize, deadline: Duration) -> Result<Vec<u8>> {
        if self.state != DecoderState::Running {
            return Err(Error::Backpressure("decoder not running".into()));
        }
        let mut buf = vec![0u8; max_bytes];
        let read_fut = {
            let child = self
                .child
                .as_mut()
                .expect("Running state implies a spawned child");
            let stdout = child
                .stdout
                .as_mut()
                .expect("piped stdout is always present while Running");
            stdout.read(&mut buf)
        };

        match timeout(deadline, read_fut).await {
            Ok(Ok(n)) => {
                buf.truncate(n);
                Ok(buf)
            }
            Ok(Err(e)) => {
                let msg = e.to_string();
                self.handle_failure(msg.clone()).await?;
                Err(Error::DecoderCrash {
                    attempt: self.restart_attempt,
                    max_attempts: self.max_restarts,
                    detail: msg,
                })
            }
            Err(_) => {
                warn!("decoder read timed out after {deadline:?}");
                Ok(Vec::new())
            }
        }
    }

    /// Drain and log stderr lines already buffered, without blocking
    /// waiting for more.
    pub async fn drain_stderr(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if let Some(stderr) = child.stderr.as_mut() {
                let mut buf = [0u8; 4096];
                if let Ok(Ok(n)) = timeout(Duration::from_millis(1), stderr.read(&mut buf)).await {
                    if n > 0 {
                        warn!(
                            "decoder stderr: {}",
                            String::from_utf8_lossy(&buf[..n])
                        );
                    }
                }
            }
        }
    }

    async fn handle_failure(&mut self, detail: String) -> Result<()> {
        self.transition(DecoderState::Restarting);
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }

        self.restart_attempt += 1;
        if self.restart_attempt > self.max_restarts {
            self.transition(DecoderState::Failed);
            return Err(Error::DecoderCrash {
                attempt: self.restart_attempt,
                max_attempts: self.max_restarts,
                detail,
            });
        }

        let backoff = DEFAULT_BACKOFF * self.restart_attempt;
        warn!(
            attempt = self.restart_attempt,
            max_attempts = self.max_restarts,
            ?backoff,
            "decoder crashed, restarting: {detail}"
        );
        tokio::time::sleep(backoff).await;

        match self.spawn().await {
            Ok(child) => {
                self.child = Some(child);
                self.transition(DecoderState::Running);
                Ok(())
            }
            Err(e) => {
                self.transition(DecoderState::Failed);
                Err(Error::DecoderCrash {
                    attempt: self.restart_attempt,
                    max_attempts: self.max_restarts,
                    detail: e.to_string(),
                })
            }
        }
    }

    /// Terminate the child and return to `Stopped`.
    pub async fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
        self.transition(DecoderState::Stopped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_fails_to_start() {
        let mut decoder = Decoder::new("__this_binary_does_not_exist__", vec![]);
        let result = decoder.start().await;
        assert!(result.is_err());
        assert_eq!(decoder.state(), DecoderState::Failed);
    }

    #[tokio::test]
    async fn write_rejected_when_not_running() {
        let mut decoder = Decoder::new("cat", vec![]);
        let result = decoder.write(b"hello").await;
        assert!(matches!(result, Err(Error::Backpressure(_))));
    }

    #[tokio::test]
    async fn cat_echoes_pcm_bytes_back() {
        let mut decoder = Decoder::new("cat", vec![]);
        decoder.start().await.expect("cat should always exist");
        decoder.write(b"hello-pcm").await.unwrap();
        let out = decoder
            .read(64, Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(out, b"hello-pcm");
        decoder.stop().await;
        assert_eq!(decoder.state(), DecoderState::Stopped);
    }
}
