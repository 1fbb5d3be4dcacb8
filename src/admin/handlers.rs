use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::orchestration::OrchestratorError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub config_version: i32,
    pub rules: usize,
    pub tags: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResponse {
    pub last_applied_version: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let orchestrator = &state.orchestrator;
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if orchestrator.is_closed() { "closed" } else { "operational" },
        config_version: orchestrator.current_version(),
        rules: orchestrator.current_config().ingress.user_rules().len(),
        tags: orchestrator
            .tags()
            .iter()
            .map(|t| format!("{}={}", t.name, t.value))
            .collect(),
    })
}

pub async fn get_config(State(state): State<AdminState>) -> Response {
    match state.orchestrator.current_configuration_json() {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize current configuration");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub async fn put_config(
    State(state): State<AdminState>,
    Path(version): Path<i32>,
    body: Bytes,
) -> (StatusCode, Json<UpdateResponse>) {
    let outcome = state.orchestrator.update_config(version, &body);

    let status = match &outcome.result {
        Ok(()) => StatusCode::OK,
        Err(OrchestratorError::Closed) => StatusCode::SERVICE_UNAVAILABLE,
        Err(_) => StatusCode::BAD_REQUEST,
    };

    (
        status,
        Json(UpdateResponse {
            last_applied_version: outcome.last_applied_version,
            error: outcome.result.err().map(|e| e.to_string()),
        }),
    )
}
