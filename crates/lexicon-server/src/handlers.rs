use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use lexicon_enrich::{JobError, JobErrorKind, JobState, Orchestrator, QueryOutcome, QueryRequest};
use lexicon_types::EntrySet;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/query", post(query))
        .route("/ws/query", get(query_ws))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<EntrySet>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    // Dropping the handler future (client went away) cancels the job.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    match state.orchestrator.run(request, &cancel, &()).await? {
        QueryOutcome::Completed(set) => Ok(Json(set)),
        QueryOutcome::Cancelled => Err(ApiError::Cancelled),
    }
}

async fn query_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| query_session(state, socket))
}

/// One query per connection: read the request, stream progress text, send
/// the result (or error) and close. Client disconnect cancels the job.
async fn query_session(state: AppState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let request = match read_request(&mut receiver).await {
        Some(Ok(request)) => request,
        Some(Err(msg)) => {
            let reply = error_message(JobState::Pending, &msg);
            let _ = sender.send(Message::Text(reply.to_string().into())).await;
            let _ = sender.close().await;
            return;
        }
        None => return,
    };

    let cancel = CancellationToken::new();
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let orchestrator = Arc::clone(&state.orchestrator);
    let job_cancel = cancel.clone();
    let mut job = tokio::spawn(async move {
        orchestrator
            .run(request, &job_cancel, &progress_tx)
            .await
    });

    let mut client_gone = false;
    let joined = loop {
        tokio::select! {
            biased;
            Some(event) = progress_rx.recv() => {
                if !client_gone
                    && sender.send(Message::Text(event.message.into())).await.is_err()
                {
                    client_gone = true;
                    cancel.cancel();
                }
            }
            incoming = receiver.next(), if !client_gone => match incoming {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => {
                    info!("websocket client disconnected; cancelling query");
                    client_gone = true;
                    cancel.cancel();
                }
                Some(Ok(_)) => {}
            },
            joined = &mut job => break joined,
        }
    };
    if client_gone {
        return;
    }

    while let Ok(event) = progress_rx.try_recv() {
        if sender.send(Message::Text(event.message.into())).await.is_err() {
            return;
        }
    }
    let reply = match joined {
        Ok(result) => outcome_message(result),
        Err(err) => {
            error!("query task failed: {err}");
            Some(error_message(JobState::Failed, "internal server error"))
        }
    };
    if let Some(reply) = reply {
        let _ = sender.send(Message::Text(reply.to_string().into())).await;
    }
    let _ = sender.close().await;
}

async fn read_request(
    receiver: &mut SplitStream<WebSocket>,
) -> Option<Result<QueryRequest, String>> {
    while let Some(message) = receiver.next().await {
        let parsed = match message {
            Ok(Message::Text(text)) => serde_json::from_str(text.as_str()),
            Ok(Message::Binary(bytes)) => serde_json::from_slice(&bytes),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        };
        return Some(parsed.map_err(|e| format!("invalid query: {e}")));
    }
    None
}

/// Final websocket message for a finished job; `None` when cancelled.
pub fn outcome_message(result: Result<QueryOutcome, JobError>) -> Option<Value> {
    match result {
        Ok(QueryOutcome::Completed(set)) => Some(json!({ "type": "result", "data": set })),
        Ok(QueryOutcome::Cancelled) => None,
        Err(err) => {
            debug!("sending job error to client: {err}");
            Some(error_message(err.stage, &err.kind.to_string()))
        }
    }
}

fn error_message(stage: JobState, error: &str) -> Value {
    json!({ "type": "error", "stage": stage, "error": error })
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Backend(String),
    #[error("query cancelled")]
    Cancelled,
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        ApiError::BadRequest(msg.into())
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        if err.kind.is_client_error() {
            return ApiError::BadRequest(err.kind.to_string());
        }
        match err.kind {
            JobErrorKind::Translation(_) => ApiError::Backend(err.to_string()),
            _ => {
                error!("{err}");
                ApiError::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Backend(_) => StatusCode::BAD_GATEWAY,
            ApiError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexicon_enrich::ProviderError;

    #[test]
    fn error_messages_carry_the_stage() {
        let msg = outcome_message(Err(JobError {
            stage: JobState::Translating,
            kind: JobErrorKind::Translation(ProviderError::RateLimited),
        }))
        .unwrap();
        assert_eq!(msg["type"], "error");
        assert_eq!(msg["stage"], "translating");
        assert_eq!(msg["error"], "rate limited");
        assert!(outcome_message(Ok(QueryOutcome::Cancelled)).is_none());
    }

    #[test]
    fn result_message_wraps_the_entry_set() {
        let set = EntrySet::new("haus", "de", "ko");
        let msg = outcome_message(Ok(QueryOutcome::Completed(set))).unwrap();
        assert_eq!(msg["type"], "result");
        assert_eq!(msg["data"]["word"], "haus");
        assert!(msg["data"]["entries"].as_object().unwrap().is_empty());
    }

    #[test]
    fn job_errors_map_to_status_classes() {
        let status = |kind| {
            ApiError::from(JobError {
                stage: JobState::Fetching,
                kind,
            })
            .into_response()
            .status()
        };
        assert_eq!(
            status(JobErrorKind::InvalidRequest("empty".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(JobErrorKind::Translation(ProviderError::RateLimited)),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(JobErrorKind::Worker("panicked".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
