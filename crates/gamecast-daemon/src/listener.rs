//! Listener side of the broadcast: keeps a WebSocket subscription to the
//! hub alive and feeds decoded clips into the [`PlaybackQueue`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gamecast_core::wire::{Inbound, PING, decode_message};
use thiserror::Error;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::playback::PlaybackQueue;

/// Fixed pause between a dropped connection and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("listener loop is already running")]
    AlreadyRunning,

    #[error("listener has been stopped")]
    Stopped,

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal: `stop()` was called.
    Stopped,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ReconnectingClient {
    url: String,
    playback: Arc<PlaybackQueue>,
    reconnect_delay: Duration,
    running: AtomicBool,
    cancel: CancellationToken,
    state: watch::Sender<ConnectionState>,
    attempts: AtomicU64,
}

impl ReconnectingClient {
    pub fn new(url: impl Into<String>, playback: Arc<PlaybackQueue>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            url: url.into(),
            playback,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            state,
            attempts: AtomicU64::new(0),
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Connection attempts made so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Connect, listen, and reconnect after a fixed delay until [`stop`]
    /// is called. Only one loop may run at a time.
    ///
    /// [`stop`]: Self::stop
    pub async fn run(&self) -> Result<(), ClientError> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Stopped);
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ClientError::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);

        loop {
            self.state.send_replace(ConnectionState::Connecting);
            let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.connect_and_listen() => match result {
                    Ok(()) => tracing::info!(url = %self.url, "listener: connection closed"),
                    Err(e) => tracing::warn!(url = %self.url, attempt, "listener: connection error: {e}"),
                }
            }

            self.state.send_replace(ConnectionState::Disconnected);

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {
                    tracing::info!(
                        url = %self.url,
                        delay_secs = self.reconnect_delay.as_secs_f64(),
                        "listener: reconnecting"
                    );
                }
            }
        }

        self.state.send_replace(ConnectionState::Stopped);
        tracing::info!("listener: stopped");
        Ok(())
    }

    /// End the loop and drop the active connection. Terminal.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    async fn connect_and_listen(&self) -> Result<(), ClientError> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(&self.url).await?;
        self.state.send_replace(ConnectionState::Connected);
        tracing::info!(url = %self.url, "listener: connected");

        let (mut write, mut read) = ws_stream.split();
        write.send(Message::Text(PING.to_string())).await?;

        while let Some(message) = read.next().await {
            match message? {
                Message::Text(text) => self.handle_text(&text).await,
                Message::Ping(data) => write.send(Message::Pong(data)).await?,
                Message::Close(_) => break,
                _ => {}
            }
        }
        Ok(())
    }

    async fn handle_text(&self, text: &str) {
        match decode_message(text) {
            Ok(Inbound::Pong) => tracing::debug!("listener: pong"),
            Ok(Inbound::Ping) => tracing::debug!("listener: ping from hub"),
            Ok(Inbound::Notification(n)) => {
                tracing::info!(text = %n.text, bytes = n.audio.len(), "listener: commentary received");
                self.playback.enqueue(n.audio).await;
            }
            Ok(Inbound::UnknownEvent(event)) => {
                tracing::debug!(%event, "listener: ignoring event");
            }
            Ok(Inbound::Unrecognized(raw)) => {
                tracing::debug!(len = raw.len(), "listener: ignoring unrecognized message");
            }
            Err(e) => tracing::warn!(error = %e, "listener: dropping malformed notification"),
        }
    }
}
