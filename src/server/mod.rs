use crate::exec::{ExecOutput, ScriptExecutor};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

struct AppState {
    executor: Arc<Mutex<ScriptExecutor>>,
}

#[derive(Deserialize)]
pub struct ExecuteRequest {
    statement: String,
}

#[derive(Serialize)]
pub struct ExecuteResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn start_server(executor: Arc<Mutex<ScriptExecutor>>, host: &str, port: u16) {
    let state = Arc::new(AppState { executor });

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/execute", post(execute_statement))
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    tracing::info!(%addr, "HTTP server listening");
    let listener = tokio::net::TcpListener::bind(addr).await.expect("bind");
    axum::serve(listener, app).await.expect("serve");
}

async fn health_check() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn execute_statement(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExecuteRequest>,
) -> impl IntoResponse {
    // One lock for the whole statement; statements are short-lived.
    let mut executor = state.executor.lock().unwrap_or_else(|e| e.into_inner());

    let response = match executor.execute_line(&payload.statement) {
        Ok(output) => ExecuteResponse {
            status: "ok".to_string(),
            result: match output {
                ExecOutput::None => None,
                other => Some(other.to_string()),
            },
            error: None,
        },
        Err(e) => ExecuteResponse {
            status: "error".to_string(),
            result: None,
            error: Some(e.to_string()),
        },
    };

    (StatusCode::OK, Json(response))
}
