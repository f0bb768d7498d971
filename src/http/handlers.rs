//! Management API handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::config::ConfigPatch;
use crate::dispatch::{
    DispatchSettings, Message, MessageId, QueueEntryView, RemoveOutcome, StatusRecord, SubmitReceipt,
};
use crate::http::server::AppState;
use crate::http::ApiError;
use crate::observability::JournalEntry;
use crate::resilience::BreakerSnapshot;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Debug, Default, Deserialize)]
pub struct SendRequest {
    #[serde(default, alias = "to")]
    pub recipient: Option<String>,
    #[serde(default, alias = "from")]
    pub sender: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default, alias = "message")]
    pub body: Option<String>,
    #[serde(default, alias = "idempotencyKey")]
    pub idempotency_key: Option<String>,
}

impl SendRequest {
    fn into_message(self) -> Result<(Message, Option<String>), ApiError> {
        let message = Message::new(
            self.recipient.unwrap_or_default(),
            self.sender.unwrap_or_default(),
            self.subject.unwrap_or_default(),
            self.body.unwrap_or_default(),
        );
        let missing = message.missing_fields();
        if !missing.is_empty() {
            return Err(ApiError::MissingFields(missing));
        }
        Ok((message, self.idempotency_key))
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub queue_depth: usize,
    pub paused: bool,
}

#[derive(Debug, Serialize)]
pub struct PauseResponse {
    pub paused: bool,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub removed: usize,
}

#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct RemoveResponse {
    pub id: String,
    pub outcome: RemoveOutcome,
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    #[serde(flatten)]
    pub settings: DispatchSettings,
    pub paused: bool,
    pub rate_limit_in_window: usize,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        queue_depth: state.dispatcher.queue_len(),
        paused: state.dispatcher.is_paused(),
    })
}

/// Enqueue a message. The key may come from the body or the `Idempotency-Key` header.
pub async fn send(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<SubmitReceipt>, ApiError> {
    let Json(request) = payload?;
    let (message, body_key) = request.into_message()?;
    let header_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let key = body_key.or(header_key);

    let receipt = state.dispatcher.submit(message, key.as_deref())?;
    Ok(Json(receipt))
}

pub async fn status(State(state): State<AppState>) -> Json<Vec<StatusRecord>> {
    Json(state.dispatcher.status())
}

pub async fn message_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusRecord>, ApiError> {
    let message_id = MessageId::from_key(&id)?;
    state
        .dispatcher
        .message_status(&message_id)
        .map(Json)
        .ok_or(ApiError::NotFound(id))
}

pub async fn queue(State(state): State<AppState>) -> Json<Vec<QueueEntryView>> {
    Json(state.dispatcher.queue())
}

pub async fn backends(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.dispatcher.backend_status())
}

pub async fn logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Json<Vec<JournalEntry>> {
    let limit = query.limit.unwrap_or(state.journal.capacity());
    Json(state.journal.recent(limit))
}

pub async fn settings(State(state): State<AppState>) -> Json<SettingsResponse> {
    Json(settings_view(&state))
}

pub async fn update_settings(
    State(state): State<AppState>,
    payload: Result<Json<ConfigPatch>, JsonRejection>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let Json(patch) = payload?;
    state.dispatcher.set_config(&patch)?;
    Ok(Json(settings_view(&state)))
}

pub async fn pause(State(state): State<AppState>) -> Json<PauseResponse> {
    state.dispatcher.pause();
    Json(PauseResponse { paused: true })
}

pub async fn resume(State(state): State<AppState>) -> Json<PauseResponse> {
    state.dispatcher.resume();
    Json(PauseResponse { paused: false })
}

pub async fn clear(State(state): State<AppState>) -> Json<ClearResponse> {
    Json(ClearResponse {
        removed: state.dispatcher.clear_queue(),
    })
}

pub async fn remove(
    State(state): State<AppState>,
    payload: Result<Json<RemoveRequest>, JsonRejection>,
) -> Result<Json<RemoveResponse>, ApiError> {
    let Json(request) = payload?;
    let id = MessageId::from_key(&request.id)?;
    match state.dispatcher.remove_from_queue(&id) {
        RemoveOutcome::NotFound => Err(ApiError::NotFound(request.id)),
        outcome => Ok(Json(RemoveResponse {
            id: request.id,
            outcome,
        })),
    }
}

fn settings_view(state: &AppState) -> SettingsResponse {
    SettingsResponse {
        settings: (*state.dispatcher.settings()).clone(),
        paused: state.dispatcher.is_paused(),
        rate_limit_in_window: state.dispatcher.rate_limit_usage(),
    }
}
