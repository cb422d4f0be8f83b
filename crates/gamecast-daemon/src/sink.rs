//! Audio output sink: the single destination playback is serialized
//! against.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum SinkError {
    /// The output still holds a handle from an earlier session.
    #[error("stale output session: {0}")]
    StaleSession(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("output not connected")]
    NotConnected,

    #[error("playback failed: {0}")]
    Play(String),
}

/// Completion signal for one playback.
pub type PlaybackDone = oneshot::Sender<Result<(), SinkError>>;

#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn connect(&self, channel: &str) -> Result<(), SinkError>;
    async fn disconnect(&self) -> Result<(), SinkError>;
    /// Drop every output handle this process holds, including stale ones.
    async fn disconnect_all(&self) -> Result<(), SinkError>;
    async fn is_connected(&self) -> bool;
    async fn channel(&self) -> Option<String>;
    /// Start playing `path`. Returns once playback has started; `done`
    /// fires when it finishes.
    async fn play(&self, path: &Path, done: PlaybackDone) -> Result<(), SinkError>;
    async fn stop(&self);
}

pub const DEFAULT_PLAYER: &str = "ffplay";
pub const DEFAULT_PLAYER_ARGS: [&str; 4] = ["-nodisp", "-autoexit", "-loglevel", "quiet"];

/// Plays each file by running an external player process.
pub struct ProcessSink {
    program: PathBuf,
    args: Vec<String>,
    channel: Mutex<Option<String>>,
    current: Mutex<Option<CancellationToken>>,
}

impl Default for ProcessSink {
    fn default() -> Self {
        Self::new(
            DEFAULT_PLAYER,
            DEFAULT_PLAYER_ARGS.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl ProcessSink {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            channel: Mutex::new(None),
            current: Mutex::new(None),
        }
    }
}

#[async_trait]
impl OutputSink for ProcessSink {
    async fn connect(&self, channel: &str) -> Result<(), SinkError> {
        *self.channel.lock().await = Some(channel.to_string());
        tracing::info!(channel, program = %self.program.display(), "playback: output connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SinkError> {
        self.stop().await;
        self.channel.lock().await.take();
        Ok(())
    }

    async fn disconnect_all(&self) -> Result<(), SinkError> {
        self.disconnect().await
    }

    async fn is_connected(&self) -> bool {
        self.channel.lock().await.is_some()
    }

    async fn channel(&self) -> Option<String> {
        self.channel.lock().await.clone()
    }

    async fn play(&self, path: &Path, done: PlaybackDone) -> Result<(), SinkError> {
        if !self.is_connected().await {
            return Err(SinkError::NotConnected);
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SinkError::Play(format!("{}: {e}", self.program.display())))?;

        let cancel = CancellationToken::new();
        if let Some(previous) = self.current.lock().await.replace(cancel.clone()) {
            previous.cancel();
        }

        tokio::spawn(async move {
            let outcome = tokio::select! {
                status = child.wait() => match status {
                    Ok(s) if s.success() => Ok(()),
                    Ok(s) => Err(SinkError::Play(format!("player exited with {s}"))),
                    Err(e) => Err(SinkError::Play(e.to_string())),
                },
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    Err(SinkError::Play("stopped".into()))
                }
            };
            let _ = done.send(outcome);
        });
        Ok(())
    }

    async fn stop(&self) {
        if let Some(cancel) = self.current.lock().await.take() {
            cancel.cancel();
        }
    }
}
