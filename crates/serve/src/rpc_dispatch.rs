use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use serve_dispatcher::{DispatcherError, Dispatcher};
use serve_types::RpcError;

/// Routes one already-parsed JSON-RPC method call to the dispatcher.
/// Returns the `result` value on success.
pub async fn dispatch(dispatcher: &Arc<Dispatcher>, method: &str, params: Value) -> Result<Value, RpcError> {
    match method {
        "holon/status" => Ok(json!(dispatcher.status())),
        "holon/pause" => {
            dispatcher.pause();
            Ok(json!({"paused": true}))
        }
        "holon/resume" => {
            dispatcher.resume();
            Ok(json!({"paused": false}))
        }
        "thread/start" => {
            let params: ThreadStartParams = parse_params(params)?;
            let thread = dispatcher.start_thread(params.session_key);
            Ok(json!(thread))
        }
        "turn/start" => {
            let params: TurnStartParams = parse_params(params)?;
            let turn = dispatcher
                .start_turn(&params.thread_id, params.input)
                .await
                .map_err(to_rpc_error)?;
            Ok(json!(turn))
        }
        "turn/steer" => {
            let params: TurnSteerParams = parse_params(params)?;
            let turn = dispatcher
                .steer_turn(&params.turn_id, params.input)
                .await
                .map_err(to_rpc_error)?;
            Ok(json!(turn))
        }
        "turn/interrupt" => {
            let params: TurnInterruptParams = parse_params(params)?;
            let reason = params.reason.as_deref().unwrap_or("client_requested");
            let turn = dispatcher
                .interrupt_turn(&params.turn_id, reason)
                .await
                .map_err(to_rpc_error)?;
            Ok(json!(turn))
        }
        "turn/get" => {
            let params: TurnGetParams = parse_params(params)?;
            dispatcher
                .get_turn(&params.turn_id)
                .map(|turn| json!(turn))
                .ok_or_else(|| RpcError::invalid_params(format!("unknown turn `{}`", params.turn_id)))
        }
        "holon/logStream" => {
            let params: LogStreamParams = parse_params(params)?;
            let log = params.log.as_deref().unwrap_or("decisions");
            let limit = params.limit.unwrap_or(50).min(500);
            match dispatcher.log_tail(log, limit).await.map_err(to_rpc_error)? {
                Some(entries) => Ok(json!({"log": log, "entries": entries})),
                None => Err(RpcError::invalid_params(format!("unknown log `{log}`"))),
            }
        }
        other => Err(RpcError::method_not_found(other)),
    }
}

fn parse_params<T: for<'de> Deserialize<'de>>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|source| RpcError::invalid_params(source.to_string()))
}

fn to_rpc_error(err: DispatcherError) -> RpcError {
    RpcError::new(err.rpc_code(), err.to_string())
}

#[derive(Deserialize)]
struct ThreadStartParams {
    #[serde(default)]
    session_key: Option<String>,
}

#[derive(Deserialize)]
struct TurnStartParams {
    thread_id: String,
    #[serde(default)]
    input: Value,
}

#[derive(Deserialize)]
struct TurnSteerParams {
    turn_id: String,
    #[serde(default)]
    input: Value,
}

#[derive(Deserialize)]
struct TurnInterruptParams {
    turn_id: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct TurnGetParams {
    turn_id: String,
}

#[derive(Deserialize)]
struct LogStreamParams {
    #[serde(default)]
    log: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}
