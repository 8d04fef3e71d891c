use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use vitalis_core::dataset::Datasets;

#[derive(Clone)]
pub struct HealthState {
    datasets: Arc<Datasets>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DatasetCheck {
    pub status: &'static str,
    pub health_rows: usize,
    pub activity_rows: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub datasets: DatasetCheck,
    pub checked_at: String,
}

pub fn router(datasets: Arc<Datasets>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { datasets })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let datasets = dataset_check(&state.datasets);
    let ready = datasets.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "vitalis-server runtime initialized".to_string(),
        },
        datasets,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn dataset_check(datasets: &Datasets) -> DatasetCheck {
    let health_rows = datasets.health.len();
    let activity_rows = datasets.activity.len();
    let status = if health_rows > 0 && activity_rows > 0 { "ready" } else { "degraded" };
    DatasetCheck { status, health_rows, activity_rows }
}
