use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use gamecast_core::wire::{PING, PONG};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::hub::{BroadcastHub, DEFAULT_SUBSCRIBER_CAPACITY};

/// Default maximum number of concurrent listener connections.
const DEFAULT_MAX_CONNECTIONS: usize = 64;

/// WebSocket front of the [`BroadcastHub`]. Every accepted client becomes a
/// hub subscriber for the lifetime of its connection.
pub struct WsServer {
    addr: SocketAddr,
    hub: Arc<BroadcastHub>,
    cancel: CancellationToken,
    max_connections: usize,
    subscriber_capacity: usize,
}

impl WsServer {
    pub fn new(addr: SocketAddr, hub: Arc<BroadcastHub>, cancel: CancellationToken) -> Self {
        Self {
            addr,
            hub,
            cancel,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
        }
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_capacity = capacity;
        self
    }

    pub async fn run(&self) -> std::io::Result<()> {
        let (listener, _) = self.bind().await?;
        self.serve(listener).await
    }

    /// Bind to the configured address and return the actual local address.
    pub async fn bind(&self) -> std::io::Result<(TcpListener, SocketAddr)> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, max_connections = self.max_connections, "ws server bound");
        Ok((listener, local_addr))
    }

    /// Run the accept loop on a pre-bound listener until cancelled.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.max_connections));

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let permit = match semaphore.clone().try_acquire_owned() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    tracing::warn!(
                                        peer = %peer,
                                        max = self.max_connections,
                                        "ws: connection limit reached, rejecting"
                                    );
                                    drop(stream);
                                    continue;
                                }
                            };
                            let hub = Arc::clone(&self.hub);
                            let cancel = self.cancel.clone();
                            let capacity = self.subscriber_capacity;
                            tokio::spawn(async move {
                                let _permit = permit;
                                match tokio_tungstenite::accept_async(stream).await {
                                    Ok(ws_stream) => {
                                        if let Err(e) = handle_listener(ws_stream, hub, cancel, capacity).await {
                                            tracing::debug!(peer = %peer, error = %e, "ws listener finished with error");
                                        }
                                    }
                                    Err(e) => {
                                        tracing::debug!(peer = %peer, error = %e, "ws handshake failed");
                                    }
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "ws: TCP accept failed");
                        }
                    }
                }
                _ = self.cancel.cancelled() => {
                    tracing::info!("ws server: cancellation requested, shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Per-listener handler
// ---------------------------------------------------------------------------

async fn handle_listener(
    ws_stream: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    hub: Arc<BroadcastHub>,
    cancel: CancellationToken,
    capacity: usize,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (id, mut frames) = hub.subscribe(capacity).await;
    tracing::info!(id, "ws: listener connected");

    let result = loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    // Evicted by the hub.
                    break Ok(());
                };
                if let Err(e) = ws_tx.send(Message::Text(frame)).await {
                    break Err(e);
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) if text == PING => {
                        if let Err(e) = ws_tx.send(Message::Text(PONG.to_string())).await {
                            break Err(e);
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!(id, len = text.len(), "ws: ignoring listener text");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                            break Err(e);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(e),
                }
            }
            _ = cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break Ok(());
            }
        }
    };

    hub.unregister(id).await;
    tracing::info!(id, "ws: listener disconnected");
    result
}
