//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    CancelResponse, ErrorResponse, ListQuery, MessageRequest, MessageResponse,
    PatientListResponse, PrescriptionListResponse, StatisticsResponse,
};
use super::AppState;
use crate::db::OperatorId;
use crate::menu::{self, Keyboard};
use crate::runtime::SessionSnapshot;
use crate::state_machine::Event;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Local;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Conversation
        .route("/api/operators/:operator_id/messages", post(send_message))
        .route("/api/operators/:operator_id/cancel", post(cancel_session))
        .route("/api/operators/:operator_id/stream", get(stream_session))
        .route("/api/operators/:operator_id/session", get(get_session))
        // Read-only reports
        .route("/api/operators/:operator_id/patients", get(list_patients))
        .route(
            "/api/operators/:operator_id/prescriptions",
            get(list_prescriptions),
        )
        .route("/api/operators/:operator_id/statistics", get(get_statistics))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Conversation
// ============================================================

async fn send_message(
    State(state): State<AppState>,
    Path(operator_id): Path<OperatorId>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .sessions
        .send_event(operator_id, Event::user_message(req.text))
        .await
        .map_err(AppError::Internal)?;

    Ok(Json(MessageResponse { queued: true }))
}

async fn cancel_session(
    State(state): State<AppState>,
    Path(operator_id): Path<OperatorId>,
) -> Result<Json<CancelResponse>, AppError> {
    state
        .sessions
        .send_event(operator_id, Event::cancel())
        .await
        .map_err(AppError::Internal)?;

    Ok(Json(CancelResponse { ok: true }))
}

async fn stream_session(
    State(state): State<AppState>,
    Path(operator_id): Path<OperatorId>,
) -> impl IntoResponse {
    let (broadcast_rx, session) = state.sessions.subscribe(operator_id).await;

    // Mid-flow the client keeps whatever the last reply showed
    let keyboard = if session.state.is_idle() {
        menu::main_menu()
    } else {
        Keyboard::Unchanged
    };

    sse_stream(session, keyboard, broadcast_rx)
}

async fn get_session(
    State(state): State<AppState>,
    Path(operator_id): Path<OperatorId>,
) -> Json<SessionSnapshot> {
    Json(state.sessions.snapshot(operator_id).await)
}

// ============================================================
// Read-only Reports
// ============================================================

async fn list_patients(
    State(state): State<AppState>,
    Path(operator_id): Path<OperatorId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PatientListResponse>, AppError> {
    let limit = query
        .limit
        .unwrap_or(state.sessions.limits().patient_list);
    let patients = state
        .sessions
        .db()
        .recent_patients(operator_id, limit)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(PatientListResponse { patients }))
}

async fn list_prescriptions(
    State(state): State<AppState>,
    Path(operator_id): Path<OperatorId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PrescriptionListResponse>, AppError> {
    let limit = query
        .limit
        .unwrap_or(state.sessions.limits().prescription_list);
    let prescriptions = state
        .sessions
        .db()
        .recent_prescriptions(operator_id, limit)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(PrescriptionListResponse { prescriptions }))
}

async fn get_statistics(
    State(state): State<AppState>,
    Path(operator_id): Path<OperatorId>,
) -> Result<Json<StatisticsResponse>, AppError> {
    let statistics = state
        .sessions
        .db()
        .statistics(operator_id, Local::now().date_naive())
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(statistics.into()))
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("medbot ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        tracing::error!(status = %status, error = %message, "Request failed");
        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
