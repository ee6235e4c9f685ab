use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use entops_core::automation::{evaluate_health, ConfigHealth, OpsHealthStatus};
use entops_db::{ping, DbPool};
use serde::Serialize;

use crate::routes::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub configuration: ConfigHealth,
    pub database: HealthCheck,
    pub checked_at: String,
}

/// 503 only when the database is unreachable; missing settings degrade the payload status.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let configuration = evaluate_health(&state.critical_settings);
    let database_ready = database.status == "ready";

    let status = if database_ready && configuration.status == OpsHealthStatus::Ok {
        "ready"
    } else {
        "degraded"
    };
    let payload =
        HealthResponse { status, configuration, database, checked_at: Utc::now().to_rfc3339() };

    let status_code = if database_ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match ping(pool).await {
        Ok(()) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}
