//! HTTP surface for the survey session API.
//!
//! Thin translation layer: requests become driver calls, phases become
//! JSON views. The only failures surfaced to participants are identifier
//! resolution problems; persistence failures during finish never reach
//! the wire.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OwnedMutexGuard;

use survey_core::{Group, ScenarioStep, SqliteGateway};

use crate::session::{Session, SessionPhase, SubmitError};
use crate::session_store::SessionToken;
use crate::AppState;

pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/session", post(create_session))
        .route("/api/session/{token}/identifier", post(submit_identifier))
        .route("/api/session/{token}/react", post(react))
        .route("/api/session/{token}/advance", post(advance))
        .route("/api/session/{token}/finish", post(finish))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "survey"
    }))
}

#[derive(Serialize)]
struct CreateSessionResponse {
    token: String,
}

#[derive(Deserialize)]
struct SubmitIdentifierRequest {
    identifier: String,
}

#[derive(Deserialize)]
struct ReactRequest {
    step: u8,
}

#[derive(Serialize)]
struct ErrorResponse {
    message: String,
}

/// Client-facing view of a session's position.
#[derive(Serialize)]
struct PhaseView {
    phase: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<Group>,
}

impl PhaseView {
    fn of(phase: &SessionPhase) -> Self {
        match phase {
            SessionPhase::Prologue => Self {
                phase: "prologue",
                step: None,
                group: None,
            },
            SessionPhase::Scenario { step, group, .. } => Self {
                phase: "scenario",
                step: Some(step.number()),
                group: Some(*group),
            },
            SessionPhase::Epilogue { .. } => Self {
                phase: "epilogue",
                step: None,
                group: None,
            },
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            message: message.into(),
        }),
    )
        .into_response()
}

fn unknown_session() -> Response {
    error_response(StatusCode::NOT_FOUND, "unknown session")
}

/// Locate a session and claim its lock without waiting.
///
/// A held lock means another request for this session is still in
/// flight; per the one-activation-at-a-time contract it is rejected,
/// not queued.
async fn claim_session(
    state: &AppState,
    token: &str,
) -> Result<OwnedMutexGuard<Session<SqliteGateway>>, Response> {
    let Some(token) = SessionToken::parse(token) else {
        return Err(unknown_session());
    };
    let Some(slot) = state.store.get(&token).await else {
        return Err(unknown_session());
    };
    slot.session
        .clone()
        .try_lock_owned()
        .map_err(|_| error_response(StatusCode::CONFLICT, "a request is already in flight"))
}

async fn create_session(State(state): State<Arc<AppState>>) -> Json<CreateSessionResponse> {
    let token = state.store.create().await;
    Json(CreateSessionResponse {
        token: token.to_string(),
    })
}

async fn submit_identifier(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(request): Json<SubmitIdentifierRequest>,
) -> Response {
    let mut session = match claim_session(&state, &token).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    match session.submit_identifier(&request.identifier).await {
        Ok(_) => Json(PhaseView::of(session.phase())).into_response(),
        Err(e) => {
            let status = match &e {
                SubmitError::EmptyIdentifier | SubmitError::IdentifierTooLong { .. } => {
                    StatusCode::BAD_REQUEST
                }
                SubmitError::SessionStarted => StatusCode::CONFLICT,
                SubmitError::NotFound => StatusCode::NOT_FOUND,
                SubmitError::Gateway(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_response(status, e.to_string())
        }
    }
}

async fn react(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(request): Json<ReactRequest>,
) -> Response {
    let mut session = match claim_session(&state, &token).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let Some(step) = ScenarioStep::new(request.step) else {
        return error_response(StatusCode::BAD_REQUEST, "step must be between 1 and 4");
    };

    session.react(step);
    Json(PhaseView::of(session.phase())).into_response()
}

async fn advance(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Response {
    let mut session = match claim_session(&state, &token).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    session.advance();
    Json(PhaseView::of(session.phase())).into_response()
}

async fn finish(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Response {
    let mut session = match claim_session(&state, &token).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    session.finish().await;
    Json(PhaseView::of(session.phase())).into_response()
}
