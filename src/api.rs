//! HTTP API：同步聊天、SSE 流式聊天、历史查询与健康检查
//!
//! - POST /v1/chat        -> {"text": "..."}
//! - POST /v1/chat/stream -> SSE，事件 fragment / error / done；done 恒最后且恰好一次
//! - GET  /v1/history     -> 会话历史只读视图
//!
//! 请求 schema 严格：未知字段直接拒绝，避免拼错的参数被悄悄忽略。

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::sse::{Event, KeepAlive, Sse},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use futures_util::stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::{ChatError, ChatEvent, ChatOrchestrator};
use crate::memory::{Role, SessionStore};

pub const SERVICE_NAME: &str = "hive-gateway";

/// 共享应用状态
pub struct AppState {
    pub orchestrator: Arc<ChatOrchestrator>,
    pub store: Arc<dyn SessionStore>,
}

/// 聊天请求；model / temperature 为请求级覆盖
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatRequest {
    pub session_id: String,
    pub input: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub messages: Vec<HistoryMessage>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/v1/chat", post(api_chat))
        .route("/v1/chat/stream", post(api_chat_stream))
        .route("/v1/history", get(api_history))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// 请求日志中间件：方法、路径与最终状态码
async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = next.run(req).await;
    tracing::info!("{} {} -> {}", method, path, response.status());
    response
}

fn validate(req: &ChatRequest) -> Result<(), (StatusCode, String)> {
    if req.session_id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "session_id is required".to_string()));
    }
    if req.input.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "input is required".to_string()));
    }
    Ok(())
}

/// POST /v1/chat：等完整回复生成、过滤、提交后一次性返回
async fn api_chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    validate(&req)?;
    let text = state
        .orchestrator
        .handle(
            &req.session_id,
            req.input.trim(),
            req.model.clone(),
            req.temperature,
        )
        .await
        .map_err(|e| {
            tracing::error!(session_id = %req.session_id, "chat error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;
    Ok(Json(ChatResponse { text }))
}

/// POST /v1/chat/stream：SSE 下发 fragment 事件；失败时 error 后仍发 done。
/// 历史提交发生在流全部通过校验之后、done 之前。
async fn api_chat_stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl futures_util::Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)>
{
    validate(&req)?;

    let (tx, rx) = mpsc::unbounded_channel::<ChatEvent>();
    let orchestrator = Arc::clone(&state.orchestrator);
    let session_id = req.session_id.clone();
    let input = req.input.trim().to_string();
    let model = req.model.clone();
    let temperature = req.temperature;

    tokio::spawn(async move {
        match orchestrator
            .handle_stream(&session_id, &input, model, temperature, &tx)
            .await
        {
            Ok(_) => {}
            Err(ChatError::Disconnected) => {
                tracing::info!(%session_id, "client disconnected mid-stream, turn abandoned");
            }
            Err(e) => {
                tracing::error!(%session_id, "stream error: {}", e);
                let _ = tx.send(ChatEvent::Error {
                    text: e.to_string(),
                });
            }
        }
        let _ = tx.send(ChatEvent::Done { session_id });
    });

    let event_stream = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|ev| {
            let sse = Event::default().event(ev.name()).data(ev.data());
            (Ok::<_, Infallible>(sse), rx)
        })
    });

    Ok(Sse::new(event_stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    ))
}

/// GET /v1/history?session_id=...：返回该会话已提交的回合
async fn api_history(
    State(state): State<Arc<AppState>>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, (StatusCode, String)> {
    let session_id = q
        .session_id
        .filter(|s| !s.trim().is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "session_id is required".to_string()))?;

    let turns = state.store.read(&session_id).await;
    let messages = turns
        .iter()
        .map(|t| HistoryMessage {
            role: match t.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
            }
            .to_string(),
            content: t.content.clone(),
        })
        .collect();

    Ok(Json(HistoryResponse {
        session_id,
        messages,
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "service": SERVICE_NAME }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_schema_rejects_unknown_fields() {
        let raw = r#"{"session_id": "s", "input": "hi", "stream": true}"#;
        assert!(serde_json::from_str::<ChatRequest>(raw).is_err());
    }

    #[test]
    fn test_request_schema_accepts_overrides() {
        let raw = r#"{"session_id": "s", "input": "hi", "model": "deepseek-chat", "temperature": 0.7}"#;
        let req: ChatRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.model.as_deref(), Some("deepseek-chat"));
        assert_eq!(req.temperature, Some(0.7));
    }

    #[test]
    fn test_request_schema_requires_input() {
        let raw = r#"{"session_id": "s"}"#;
        assert!(serde_json::from_str::<ChatRequest>(raw).is_err());
    }
}
