use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;
use vitalis_agent::{AgentRuntime, AnalysisResponse, RequestOptions};
use vitalis_core::errors::{ApplicationError, DomainError, InterfaceError};

const MAX_STEPS_LIMIT: u32 = 500;

#[derive(Clone)]
pub struct ApiState {
    pub runtime: Arc<AgentRuntime>,
    /// Cancelled when the server gives up waiting for in-flight requests.
    pub requests: CancellationToken,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub query: String,
    #[serde(default)]
    pub max_steps: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: &'static str,
    pub correlation_id: String,
}

pub struct ApiError(InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self.0 {
            InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
            InterfaceError::ServiceUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        let body = ErrorBody {
            error,
            message: self.0.user_message(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new().route("/analyze", post(analyze)).with_state(state)
}

pub async fn analyze(
    State(state): State<ApiState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let correlation_id = format!("req_{}", Uuid::new_v4().simple());
    validate(&request).map_err(|error| {
        warn!(
            event_name = "system.api.bad_request",
            correlation_id = %correlation_id,
            error = %error,
            "analyze request rejected"
        );
        ApiError(ApplicationError::from(error).into_interface(correlation_id.clone()))
    })?;

    let options = RequestOptions {
        max_steps: request.max_steps,
        cancel: Some(state.requests.child_token()),
        correlation_id: Some(correlation_id),
    };
    Ok(Json(state.runtime.handle_query_with(&request.query, options).await))
}

fn validate(request: &AnalyzeRequest) -> Result<(), DomainError> {
    if request.query.trim().is_empty() {
        return Err(DomainError::InvariantViolation("query must not be empty".to_string()));
    }
    if let Some(max_steps) = request.max_steps {
        if !(1..=MAX_STEPS_LIMIT).contains(&max_steps) {
            return Err(DomainError::InvariantViolation(format!(
                "max_steps must be between 1 and {MAX_STEPS_LIMIT}"
            )));
        }
    }
    Ok(())
}
