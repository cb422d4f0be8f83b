//! Serialized audio playback against a single output sink.
//!
//! One worker per connected output session pops queued clips, stages each
//! in a temporary file, starts playback and waits for the completion signal
//! with a bound. The temporary file is removed on every exit path.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, Notify, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::sink::{OutputSink, SinkError};

/// Upper bound on a single clip before playback is force-stopped.
pub const DEFAULT_PLAYBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause between force-disconnecting stale handles and the retry.
pub const DEFAULT_STALE_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("output connect failed: {0}")]
    Connect(#[source] SinkError),

    #[error("output error: {0}")]
    Sink(#[from] SinkError),

    #[error("could not stage audio: {0}")]
    Stage(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    /// Already connected to the requested channel; nothing changed.
    AlreadyConnected,
    /// Another connect attempt is in flight; this one was collapsed into it.
    InProgress,
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Clears the in-flight connect flag when the attempt finishes.
struct ConnectGuard<'a>(&'a AtomicBool);

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct PlaybackQueue {
    sink: Arc<dyn OutputSink>,
    queue: Mutex<VecDeque<Vec<u8>>>,
    available: Notify,
    state: watch::Sender<OutputState>,
    connecting: AtomicBool,
    worker: Mutex<Option<Worker>>,
    playback_timeout: Duration,
    stale_retry_delay: Duration,
}

impl PlaybackQueue {
    pub fn new(sink: Arc<dyn OutputSink>) -> Self {
        let (state, _) = watch::channel(OutputState::Disconnected);
        Self {
            sink,
            queue: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            state,
            connecting: AtomicBool::new(false),
            worker: Mutex::new(None),
            playback_timeout: DEFAULT_PLAYBACK_TIMEOUT,
            stale_retry_delay: DEFAULT_STALE_RETRY_DELAY,
        }
    }

    pub fn with_playback_timeout(mut self, timeout: Duration) -> Self {
        self.playback_timeout = timeout;
        self
    }

    pub fn with_stale_retry_delay(mut self, delay: Duration) -> Self {
        self.stale_retry_delay = delay;
        self
    }

    pub fn state(&self) -> OutputState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<OutputState> {
        self.state.subscribe()
    }

    pub async fn queued(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Connect the output to `channel` and start the playback worker.
    ///
    /// Switching to a different channel drops everything still queued for
    /// the old one. A stale-session failure force-disconnects every output
    /// handle and retries once.
    pub async fn connect(self: &Arc<Self>, channel: &str) -> Result<ConnectOutcome, PlaybackError> {
        if self
            .connecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(channel, "playback: connect already in flight");
            return Ok(ConnectOutcome::InProgress);
        }
        let _guard = ConnectGuard(&self.connecting);

        if self.state() == OutputState::Connected {
            if self.sink.channel().await.as_deref() == Some(channel) {
                return Ok(ConnectOutcome::AlreadyConnected);
            }
            tracing::info!(channel, "playback: moving output to a new channel");
            self.stop_worker().await;
            if let Err(e) = self.sink.disconnect().await {
                tracing::warn!(error = %e, "playback: disconnect from previous channel failed");
            }
        }

        self.clear().await;
        self.state.send_replace(OutputState::Connecting);

        if let Err(e) = self.connect_with_retry(channel).await {
            self.state.send_replace(OutputState::Disconnected);
            return Err(PlaybackError::Connect(e));
        }

        self.state.send_replace(OutputState::Connected);
        self.start_worker().await;
        tracing::info!(channel, "playback: output connected");
        Ok(ConnectOutcome::Connected)
    }

    async fn connect_with_retry(&self, channel: &str) -> Result<(), SinkError> {
        match self.sink.connect(channel).await {
            Err(SinkError::StaleSession(reason)) => {
                tracing::warn!(%reason, "playback: stale output session, forcing cleanup and retrying");
                if let Err(e) = self.sink.disconnect_all().await {
                    tracing::warn!(error = %e, "playback: force disconnect failed");
                }
                tokio::time::sleep(self.stale_retry_delay).await;
                self.sink.connect(channel).await
            }
            other => other,
        }
    }

    /// Queue a clip. Dropped with a warning when no output is connected.
    pub async fn enqueue(&self, audio: Vec<u8>) -> bool {
        if self.state() != OutputState::Connected {
            tracing::warn!(bytes = audio.len(), "playback: output not connected, dropping clip");
            return false;
        }
        let depth = {
            let mut queue = self.queue.lock().await;
            queue.push_back(audio);
            queue.len()
        };
        self.available.notify_one();
        tracing::debug!(depth, "playback: clip queued");
        true
    }

    /// Stop playback, drop the queue and leave the channel.
    pub async fn disconnect(&self) -> Result<(), PlaybackError> {
        self.stop_worker().await;
        self.clear().await;
        let result = self.sink.disconnect().await;
        self.state.send_replace(OutputState::Disconnected);
        tracing::info!("playback: output disconnected");
        Ok(result?)
    }

    /// Like [`disconnect`](Self::disconnect) but drops every output handle
    /// the process holds.
    pub async fn force_cleanup(&self) -> Result<(), PlaybackError> {
        self.stop_worker().await;
        self.clear().await;
        let result = self.sink.disconnect_all().await;
        self.state.send_replace(OutputState::Disconnected);
        tracing::info!("playback: forced cleanup complete");
        Ok(result?)
    }

    /// Drop every queued clip. The clip currently playing is unaffected.
    async fn clear(&self) {
        let dropped = {
            let mut queue = self.queue.lock().await;
            let n = queue.len();
            queue.clear();
            n
        };
        if dropped > 0 {
            tracing::info!(dropped, "playback: queue cleared");
        }
    }

    async fn start_worker(self: &Arc<Self>) {
        let mut slot = self.worker.lock().await;
        if let Some(worker) = slot.as_ref() {
            if !worker.handle.is_finished() {
                return;
            }
        }
        let cancel = CancellationToken::new();
        let queue = Arc::clone(self);
        let token = cancel.clone();
        let handle = tokio::spawn(async move { queue.run_worker(token).await });
        *slot = Some(Worker { cancel, handle });
    }

    async fn stop_worker(&self) {
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            worker.cancel.cancel();
            if let Err(e) = worker.handle.await {
                tracing::warn!(error = %e, "playback: worker task failed");
            }
        }
    }

    async fn run_worker(&self, cancel: CancellationToken) {
        tracing::debug!("playback: worker started");
        loop {
            let audio = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                audio = self.next_clip() => audio,
            };
            if !self.sink.is_connected().await {
                tracing::warn!("playback: output lost its channel, ending session");
                self.clear().await;
                self.state.send_replace(OutputState::Disconnected);
                break;
            }
            if let Err(e) = self.play_clip(audio, &cancel).await {
                tracing::warn!(error = %e, "playback: clip failed");
            }
        }
        tracing::debug!("playback: worker stopped");
    }

    async fn next_clip(&self) -> Vec<u8> {
        loop {
            if let Some(audio) = self.queue.lock().await.pop_front() {
                return audio;
            }
            self.available.notified().await;
        }
    }

    async fn play_clip(&self, audio: Vec<u8>, cancel: &CancellationToken) -> Result<(), PlaybackError> {
        // Removed from disk when dropped, whichever way this returns.
        let mut file = tempfile::Builder::new()
            .prefix("gamecast-")
            .suffix(".mp3")
            .tempfile()?;
        file.write_all(&audio)?;
        file.flush()?;

        let (done_tx, done_rx) = oneshot::channel();
        self.sink.play(file.path(), done_tx).await?;

        tokio::select! {
            result = tokio::time::timeout(self.playback_timeout, done_rx) => match result {
                Ok(Ok(Ok(()))) => tracing::debug!(bytes = audio.len(), "playback: clip finished"),
                Ok(Ok(Err(e))) => tracing::warn!(error = %e, "playback: output reported an error"),
                Ok(Err(_)) => tracing::warn!("playback: output dropped the completion signal"),
                Err(_) => {
                    tracing::warn!(
                        timeout_secs = self.playback_timeout.as_secs_f64(),
                        "playback: clip timed out, stopping"
                    );
                    self.sink.stop().await;
                }
            },
            _ = cancel.cancelled() => self.sink.stop().await,
        }

        drop(file);
        Ok(())
    }
}
