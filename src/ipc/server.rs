//! Local IPC server for `kerbside-ctl` commands.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate and routes line-delimited JSON commands to
//! the engine handle.
//!
//! ## Protocol
//!
//! Request (one JSON object per line):
//! ```json
//! {"command": "status"}
//! {"command": "refresh"}
//! {"command": "complete", "task": "red_put_out", "completed": true}
//! {"command": "params"}
//! {"command": "set_param", "name": "red_put_out_pre_hours", "value": 5.5}
//! ```
//!
//! Response (one JSON object per line):
//! ```json
//! {"ok": true, "data": { ... } }
//! {"ok": false, "error": "invalid input: ..."}
//! ```

use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::models::{ParameterKey, TaskKey};
use crate::schedule::parameters::validate_hours;
use crate::schedule::EngineHandle;
use crate::{AppError, Result};

/// Inbound IPC request from `kerbside-ctl`.
#[derive(Debug, Deserialize)]
pub struct IpcRequest {
    /// Command verb.
    pub command: String,
    /// Task name (for `complete`).
    #[serde(default)]
    pub task: Option<String>,
    /// Desired completion flag (for `complete`).
    #[serde(default)]
    pub completed: Option<bool>,
    /// Parameter name (for `set_param`).
    #[serde(default)]
    pub name: Option<String>,
    /// Parameter value in hours (for `set_param`).
    #[serde(default)]
    pub value: Option<f64>,
}

/// Outbound IPC response to `kerbside-ctl`.
#[derive(Debug, Serialize)]
pub struct IpcResponse {
    /// Whether the command succeeded.
    pub ok: bool,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IpcResponse {
    fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

impl From<Result<serde_json::Value>> for IpcResponse {
    fn from(result: Result<serde_json::Value>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(err) => Self::error(err.to_string()),
        }
    }
}

/// Spawn the IPC server task.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the listener cannot be created.
pub fn spawn_ipc_server(
    name: &str,
    engine: EngineHandle,
    ct: CancellationToken,
) -> Result<JoinHandle<()>> {
    let listener_name = name
        .to_owned()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{name}': {err}")))?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;

    info!(ipc_name = %name, "IPC server listening");

    let span = info_span!("ipc_server", name = %name);
    let handle = tokio::spawn(
        async move {
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("IPC server shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                tokio::spawn(handle_connection(stream, engine.clone()));
                            }
                            Err(err) => {
                                warn!(%err, "IPC accept failed");
                            }
                        }
                    }
                }
            }
        }
        .instrument(span),
    );

    Ok(handle)
}

/// Handle a single IPC client connection.
async fn handle_connection(stream: interprocess::local_socket::tokio::Stream, engine: EngineHandle) {
    let span = info_span!("ipc_conn");
    async move {
        let (reader, mut writer) = stream.split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match buf_reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let response = dispatch_line(trimmed, &engine).await;
                    let mut response_line = serde_json::to_string(&response).unwrap_or_else(|_| {
                        r#"{"ok":false,"error":"serialization failed"}"#.to_owned()
                    });
                    response_line.push('\n');

                    if let Err(err) = writer.write_all(response_line.as_bytes()).await {
                        warn!(%err, "failed to write ipc response");
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "ipc read error");
                    break;
                }
            }
        }

        info!("IPC connection closed");
    }
    .instrument(span)
    .await;
}

/// Parse one request line and run it.
pub async fn dispatch_line(line: &str, engine: &EngineHandle) -> IpcResponse {
    match serde_json::from_str::<IpcRequest>(line) {
        Ok(request) => dispatch_command(&request, engine).await,
        Err(err) => IpcResponse::error(format!("invalid json: {err}")),
    }
}

/// Route an IPC command to the appropriate handler.
pub async fn dispatch_command(request: &IpcRequest, engine: &EngineHandle) -> IpcResponse {
    let span = info_span!("ipc_command", command = %request.command);
    async move {
        match request.command.as_str() {
            "status" => handle_status(engine).into(),
            "refresh" => handle_refresh(engine).await.into(),
            "complete" => handle_complete(request, engine).await.into(),
            "params" => handle_params(engine).into(),
            "set_param" => handle_set_param(request, engine).await.into(),
            other => IpcResponse::error(format!("unknown command: {other}")),
        }
    }
    .instrument(span)
    .await
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|err| AppError::Ipc(format!("serialization failed: {err}")))
}

fn handle_status(engine: &EngineHandle) -> Result<serde_json::Value> {
    to_json(&engine.view())
}

async fn handle_refresh(engine: &EngineHandle) -> Result<serde_json::Value> {
    let snapshot = engine.refresh().await;
    to_json(&snapshot)
}

/// Set or clear a completion flag.
///
/// Turning completion on is only offered while the task's window is active;
/// turning it off is always allowed.
async fn handle_complete(request: &IpcRequest, engine: &EngineHandle) -> Result<serde_json::Value> {
    let Some(ref name) = request.task else {
        return Err(AppError::InvalidInput("missing required 'task' field".into()));
    };
    let task: TaskKey = name.parse()?;
    let completed = request.completed.unwrap_or(true);

    if completed {
        let available = engine
            .view()
            .task(task)
            .is_some_and(|view| view.completion_available);
        if !available {
            return Err(AppError::InvalidInput(format!(
                "{task} is not due; completion is only available while its window is open"
            )));
        }
    }

    let view = engine.set_completion(task, completed).await?;
    info!(task = %task, completed, "completion changed via IPC");
    to_json(&view)
}

fn handle_params(engine: &EngineHandle) -> Result<serde_json::Value> {
    to_json(&engine.view().parameters)
}

async fn handle_set_param(request: &IpcRequest, engine: &EngineHandle) -> Result<serde_json::Value> {
    let Some(ref name) = request.name else {
        return Err(AppError::InvalidInput("missing required 'name' field".into()));
    };
    let Some(value) = request.value else {
        return Err(AppError::InvalidInput("missing required 'value' field".into()));
    };
    let key: ParameterKey = name.parse()?;
    let value = validate_hours(value)?;

    let stored = engine.set_parameter(key, value).await?;
    info!(parameter = %key, value = stored, "parameter changed via IPC");
    Ok(serde_json::json!({ "name": key.to_string(), "value": stored }))
}
