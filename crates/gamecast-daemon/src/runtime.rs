//! Long-running entry points: `serve` and `listen`.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use gamecast_core::detect::DetectorConfig;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::cli::{IngestOpts, ListenOpts, ServeOpts};
use crate::client::rpc_call;
use crate::hub::BroadcastHub;
use crate::ingest_server::IngestServer;
use crate::listener::ReconnectingClient;
use crate::notifier::Notifier;
use crate::openai::{OpenAiClient, OpenAiConfig};
use crate::playback::PlaybackQueue;
use crate::service::MatchService;
use crate::sink::{DEFAULT_PLAYER_ARGS, ProcessSink};
use crate::ws_server::WsServer;

/// Resolves on ctrl-c or SIGTERM.
pub async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await?;
        tracing::info!("received ctrl-c, shutting down");
    }

    Ok(())
}

/// Match service + WebSocket hub + ingest socket until shutdown.
pub async fn serve(opts: ServeOpts, socket_path: &str) -> anyhow::Result<()> {
    let openai = Arc::new(OpenAiClient::new(OpenAiConfig {
        api_key: opts.openai_api_key,
        base_url: opts.openai_base_url,
        chat_model: opts.chat_model,
        speech_model: opts.speech_model,
        timeout: Duration::from_secs(opts.request_timeout_secs),
    })?);
    let notifier = Notifier::new(openai.clone(), openai).with_voice(opts.voice);
    let detector = DetectorConfig::default()
        .with_gold_milestones(opts.gold_milestones)
        .with_cs_milestones(opts.cs_milestones);

    let hub = Arc::new(BroadcastHub::new());
    let service = Arc::new(MatchService::new(
        opts.secret_token,
        detector,
        notifier,
        Arc::clone(&hub),
    ));

    let cancel = CancellationToken::new();
    let ws = WsServer::new(opts.ws_addr, hub, cancel.clone())
        .with_max_connections(opts.max_connections);
    let ingest = IngestServer::new(socket_path, service, cancel.clone());

    let (ws_listener, ws_addr) = ws.bind().await?;
    let uds_listener = ingest.bind().await?;
    tracing::info!(ws = %ws_addr, socket = socket_path, "gamecast server ready");

    let ws_task = tokio::spawn(async move {
        ws.serve(ws_listener)
            .await
            .map_err(anyhow::Error::from)
    });
    let ingest_task = tokio::spawn(async move { ingest.serve(uds_listener).await });

    supervise(shutdown_signal(), ws_task, ingest_task, &cancel).await?;
    tracing::info!("gamecast server stopped");
    Ok(())
}

type ServerTask = JoinHandle<anyhow::Result<()>>;

fn joined(result: Result<anyhow::Result<()>, JoinError>) -> anyhow::Result<()> {
    result?
}

/// Wait for shutdown or for either server to exit, cancel the other, and
/// return the first error any of them produced.
async fn supervise(
    shutdown: impl Future<Output = anyhow::Result<()>>,
    mut ws_task: ServerTask,
    mut ingest_task: ServerTask,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let mut ws_done = false;
    let mut ingest_done = false;

    let first = tokio::select! {
        result = shutdown => result,
        result = &mut ws_task => {
            ws_done = true;
            tracing::warn!("ws server exited unexpectedly");
            joined(result)
        }
        result = &mut ingest_task => {
            ingest_done = true;
            tracing::warn!("ingest server exited unexpectedly");
            joined(result)
        }
    };
    if let Err(e) = &first {
        tracing::error!(error = %e, "shutting down after server failure");
    }

    cancel.cancel();
    let ws_result = if ws_done { Ok(()) } else { joined(ws_task.await) };
    let ingest_result = if ingest_done {
        Ok(())
    } else {
        joined(ingest_task.await)
    };
    first.and(ws_result).and(ingest_result)
}

/// Reconnecting listener feeding a process-backed player until shutdown.
pub async fn listen(opts: ListenOpts) -> anyhow::Result<()> {
    let args = if opts.player_args.is_empty() {
        DEFAULT_PLAYER_ARGS.iter().map(|s| s.to_string()).collect()
    } else {
        opts.player_args
    };
    let sink = Arc::new(ProcessSink::new(opts.player, args));
    let playback = Arc::new(
        PlaybackQueue::new(sink)
            .with_playback_timeout(Duration::from_secs(opts.playback_timeout_secs)),
    );
    playback.connect(&opts.channel).await?;

    let client = Arc::new(
        ReconnectingClient::new(opts.url, Arc::clone(&playback))
            .with_reconnect_delay(Duration::from_secs(opts.reconnect_delay_secs)),
    );
    let runner = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.run().await })
    };

    let signal = shutdown_signal().await;
    client.stop();
    runner.await??;
    playback.disconnect().await?;
    tracing::info!("listener stopped");
    signal
}

/// Read the payload file (`-` for stdin) and ingest it.
pub async fn ingest_file(opts: IngestOpts, socket_path: &str) -> anyhow::Result<serde_json::Value> {
    let raw = if opts.file == Path::new("-") {
        let mut buf = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut tokio::io::stdin(), &mut buf).await?;
        buf
    } else {
        tokio::fs::read_to_string(&opts.file).await?
    };
    let payload: serde_json::Value = serde_json::from_str(&raw)?;
    rpc_call(
        socket_path,
        "ingest",
        serde_json::json!({ "token": opts.token, "payload": payload }),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn until_cancelled(cancel: &CancellationToken) -> ServerTask {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            Ok(())
        })
    }

    #[tokio::test]
    async fn server_failure_is_returned_and_stops_the_other() {
        let cancel = CancellationToken::new();
        let ws_task = until_cancelled(&cancel);
        let ingest_task = tokio::spawn(async { Err::<(), _>(anyhow::anyhow!("accept failed")) });

        let err = supervise(std::future::pending(), ws_task, ingest_task, &cancel)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("accept failed"));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn error_after_cancel_is_still_reported() {
        let cancel = CancellationToken::new();
        let ws_task = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                Err::<(), _>(anyhow::anyhow!("ws drain failed"))
            })
        };
        let ingest_task = until_cancelled(&cancel);

        let err = supervise(async { Ok::<_, anyhow::Error>(()) }, ws_task, ingest_task, &cancel)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ws drain failed"));
    }

    #[tokio::test]
    async fn clean_shutdown_joins_both_servers() {
        let cancel = CancellationToken::new();
        let ws_task = until_cancelled(&cancel);
        let ingest_task = until_cancelled(&cancel);

        supervise(async { Ok::<_, anyhow::Error>(()) }, ws_task, ingest_task, &cancel)
            .await
            .unwrap();
        assert!(cancel.is_cancelled());
    }
}
