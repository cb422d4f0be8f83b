//! Local ingest socket: newline-delimited JSON-RPC 2.0 over a Unix socket,
//! one request per connection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use crate::service::{MatchService, ServiceError};

pub const PARSE_ERROR: i32 = -32700;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const UNAUTHORIZED: i32 = -32001;
pub const SESSION_ERROR: i32 = -32002;

fn default_jsonrpc() -> String {
    "2.0".to_string()
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    pub id: Option<u64>,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    fn ok(id: Option<u64>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Option<u64>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserParams {
    token: String,
    user: String,
}

#[derive(Debug, Deserialize)]
struct IngestParams {
    token: String,
    payload: serde_json::Value,
}

fn service_error(id: Option<u64>, e: ServiceError) -> JsonRpcResponse {
    let code = match &e {
        ServiceError::Unauthorized => UNAUTHORIZED,
        ServiceError::Session(_) => SESSION_ERROR,
        ServiceError::Payload(_) => INVALID_PARAMS,
    };
    JsonRpcResponse::err(id, code, e.to_string())
}

fn params<T: serde::de::DeserializeOwned>(
    req: &JsonRpcRequest,
) -> Result<T, JsonRpcResponse> {
    serde_json::from_value(req.params.clone())
        .map_err(|e| JsonRpcResponse::err(req.id, INVALID_PARAMS, format!("invalid params: {e}")))
}

fn encode_result<T: Serialize>(id: Option<u64>, method: &str, value: &T) -> JsonRpcResponse {
    match serde_json::to_value(value) {
        Ok(value) => JsonRpcResponse::ok(id, value),
        Err(e) => {
            tracing::error!(method, error = %e, "ingest: could not encode result");
            JsonRpcResponse::err(id, INTERNAL_ERROR, format!("internal error: {e}"))
        }
    }
}

/// Dispatch one request against the service.
pub async fn dispatch(service: &MatchService, req: JsonRpcRequest) -> JsonRpcResponse {
    let id = req.id;
    let result = match req.method.as_str() {
        "establish" => match params::<UserParams>(&req) {
            Ok(p) => service
                .establish(&p.token, &p.user)
                .await
                .map(|s| serde_json::json!({ "session": s })),
            Err(resp) => return resp,
        },
        "disconnect" => match params::<UserParams>(&req) {
            Ok(p) => service
                .disconnect(&p.token, &p.user)
                .await
                .map(|s| serde_json::json!({ "session": s })),
            Err(resp) => return resp,
        },
        "ingest" => match params::<IngestParams>(&req) {
            Ok(p) => match service.ingest(&p.token, p.payload).await {
                Ok(report) => return encode_result(id, &req.method, &report),
                Err(e) => Err(e),
            },
            Err(resp) => return resp,
        },
        "status" => return encode_result(id, &req.method, &service.status().await),
        other => {
            return JsonRpcResponse::err(id, METHOD_NOT_FOUND, format!("method not found: {other}"));
        }
    };

    match result {
        Ok(value) => JsonRpcResponse::ok(id, value),
        Err(e) => {
            tracing::info!(method = %req.method, error = %e, "ingest: request rejected");
            service_error(id, e)
        }
    }
}

pub struct IngestServer {
    socket_path: PathBuf,
    service: Arc<MatchService>,
    cancel: CancellationToken,
}

impl IngestServer {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        service: Arc<MatchService>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            service,
            cancel,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Prepare the socket directory, clear a stale socket, and bind.
    pub async fn bind(&self) -> anyhow::Result<UnixListener> {
        let path = self.socket_path.as_path();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
            }
        }

        if path.exists() {
            if UnixStream::connect(path).await.is_ok() {
                anyhow::bail!("another gamecast server is already listening at {}", path.display());
            }
            std::fs::remove_file(path)?;
            tracing::info!(path = %path.display(), "ingest: removed stale socket");
        }

        let listener = UnixListener::bind(path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        tracing::info!(path = %path.display(), "ingest: listening");
        Ok(listener)
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: UnixListener) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _) = accepted?;
                    let service = Arc::clone(&self.service);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, service).await {
                            tracing::debug!("ingest: connection error: {e}");
                        }
                    });
                }
                _ = self.cancel.cancelled() => {
                    tracing::info!("ingest: cancellation requested, shutting down");
                    break;
                }
            }
        }
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            tracing::debug!(error = %e, "ingest: socket cleanup failed");
        }
        Ok(())
    }
}

async fn handle_connection(stream: UnixStream, service: Arc<MatchService>) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let response = match serde_json::from_str::<JsonRpcRequest>(line.trim()) {
        Ok(req) => {
            tracing::debug!(method = %req.method, id = ?req.id, "ingest: request received");
            dispatch(&service, req).await
        }
        Err(e) => JsonRpcResponse::err(None, PARSE_ERROR, format!("parse error: {e}")),
    };

    let mut out = serde_json::to_string(&response)?;
    out.push('\n');
    writer.write_all(out.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::rpc_call;
    use crate::service::tests::{SECRET, payload, service};
    use serde_json::json;

    fn request(method: &str, params: serde_json::Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(7),
            method: method.into(),
            params,
        }
    }

    fn code(resp: &JsonRpcResponse) -> Option<i32> {
        resp.error.as_ref().map(|e| e.code)
    }

    #[test]
    fn unencodable_result_is_an_internal_error() {
        use std::collections::BTreeMap;

        let mut bad = BTreeMap::new();
        bad.insert((1u8, 2u8), "tuple keys are not JSON");
        let resp = encode_result(Some(3), "status", &bad);
        assert_eq!(code(&resp), Some(INTERNAL_ERROR));
        assert!(resp.result.is_none());
        assert_eq!(resp.id, Some(3));

        let resp = encode_result(Some(4), "status", &json!({"ok": true}));
        assert!(resp.error.is_none());
        assert_eq!(resp.result, Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn dispatch_maps_errors_to_codes() {
        let svc = service();
        let resp = dispatch(&svc, request("nope", json!({}))).await;
        assert_eq!(code(&resp), Some(METHOD_NOT_FOUND));
        assert_eq!(resp.id, Some(7));

        let resp = dispatch(&svc, request("establish", json!({"user": "alice"}))).await;
        assert_eq!(code(&resp), Some(INVALID_PARAMS));

        let resp = dispatch(&svc, request("establish", json!({"token": "bad", "user": "a"}))).await;
        assert_eq!(code(&resp), Some(UNAUTHORIZED));

        let resp = dispatch(
            &svc,
            request("ingest", json!({"token": SECRET, "payload": payload(0)})),
        )
        .await;
        assert_eq!(code(&resp), Some(SESSION_ERROR));
    }

    #[tokio::test]
    async fn dispatch_establish_and_ingest() {
        let svc = service();
        let resp = dispatch(
            &svc,
            request("establish", json!({"token": SECRET, "user": "alice"})),
        )
        .await;
        let result = resp.result.unwrap();
        assert_eq!(result["session"]["user"], "alice");
        assert!(result["session"].get("token").is_none());

        let resp = dispatch(
            &svc,
            request("ingest", json!({"token": SECRET, "payload": payload(0)})),
        )
        .await;
        assert_eq!(resp.result.unwrap()["events"], json!([]));

        let resp = dispatch(
            &svc,
            request("ingest", json!({"token": SECRET, "payload": {"allPlayers": 3}})),
        )
        .await;
        assert_eq!(code(&resp), Some(INVALID_PARAMS));
    }

    #[tokio::test]
    async fn socket_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run/gamecast.sock");
        let cancel = CancellationToken::new();
        let server = IngestServer::new(&path, Arc::new(service()), cancel.clone());
        let listener = server.bind().await.unwrap();
        let handle = tokio::spawn(async move { server.serve(listener).await });

        let socket = path.to_str().unwrap();
        let status = rpc_call(socket, "status", json!({})).await.unwrap();
        assert_eq!(status["state"], "absent");

        rpc_call(socket, "establish", json!({"token": SECRET, "user": "alice"}))
            .await
            .unwrap();
        let err = rpc_call(socket, "establish", json!({"token": SECRET, "user": "bob"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already connected"));

        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn garbage_line_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gamecast.sock");
        let cancel = CancellationToken::new();
        let server = IngestServer::new(&path, Arc::new(service()), cancel.clone());
        let listener = server.bind().await.unwrap();
        tokio::spawn(async move { server.serve(listener).await });

        let stream = UnixStream::connect(&path).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer.write_all(b"{not json\n").await.unwrap();
        let mut line = String::new();
        BufReader::new(reader).read_line(&mut line).await.unwrap();
        let resp: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(resp["error"]["code"], PARSE_ERROR);
        cancel.cancel();
    }
}
