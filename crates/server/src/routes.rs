//! HTTP surface.
//!
//! - `GET  /health`                      configuration health plus database ping
//! - `POST /api/agent/run`               streamed agent run (SSE)
//! - `POST /api/deals/{deal_id}/autopilot` recommend and materialize autopilot tasks
//! - `POST /api/autopilot/sweep`         batch autopilot over target-stage deals (cron bearer)
//! - `POST /api/automation/events`       dispatch a domain event on the bus
//! - `GET  /api/automation/health`       per-handler health
//! - `GET  /api/automation/stats`        today's automation totals
//! - `POST /api/screening`                1-5 deal screening against a playbook
//! - `POST /api/screening/listing`        weighted listing score and tier
//! - `POST /api/screening/triage`         weighted triage score and decision

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use entops_agent::{sse, AgentRunRequest, AgentRunner, QueryIntent, RunContext};
use entops_core::automation::{AutomationBus, CriticalSettings, DomainEvent};
use entops_core::config::AgentConfig;
use entops_core::domain::deal::{DealId, OrgId};
use entops_core::errors::{ApplicationError, InterfaceError};
use entops_core::scoring::{
    compute_listing_score, compute_screening, triage_score, DimensionScores, ScoringWeights,
    ScreeningInputs, ScreeningPlaybook, TriageDecision,
};
use entops_core::{
    AutopilotRunInput, EntitlementStrategyAutopilot, RecommendationInput, SweepInput,
};
use entops_db::DbPool;

use crate::health;

const FRAME_BUFFER: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub bus: Arc<AutomationBus>,
    pub autopilot: Arc<EntitlementStrategyAutopilot>,
    pub runner: Arc<AgentRunner>,
    pub agent_config: AgentConfig,
    pub critical_settings: CriticalSettings,
    pub cron_secret: Option<SecretString>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/agent/run", post(agent_run))
        .route("/api/deals/{deal_id}/autopilot", post(deal_autopilot))
        .route("/api/autopilot/sweep", post(autopilot_sweep))
        .route("/api/automation/events", post(dispatch_event))
        .route("/api/automation/health", get(automation_health))
        .route("/api/automation/stats", get(automation_stats))
        .route("/api/screening", post(screen_deal))
        .route("/api/screening/listing", post(score_listing))
        .route("/api/screening/triage", post(score_triage))
        .with_state(state)
}

/// Error body: `{error, correlationId}`.
pub struct ApiError(InterfaceError);

impl ApiError {
    fn bad_request(message: impl Into<String>, correlation_id: &str) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: correlation_id.to_string(),
        })
    }

    fn unauthorized(message: impl Into<String>, correlation_id: &str) -> Self {
        Self(InterfaceError::Unauthorized {
            message: message.into(),
            correlation_id: correlation_id.to_string(),
        })
    }

    fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        Self(error.into_interface(correlation_id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            InterfaceError::BadRequest { message, .. } => (StatusCode::BAD_REQUEST, message.clone()),
            InterfaceError::Unauthorized { .. } => {
                (StatusCode::UNAUTHORIZED, self.0.user_message().to_string())
            }
            InterfaceError::NotFound { .. } => {
                (StatusCode::NOT_FOUND, self.0.user_message().to_string())
            }
            InterfaceError::ServiceUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, self.0.user_message().to_string())
            }
            InterfaceError::Internal { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.0.user_message().to_string())
            }
        };
        if status.is_server_error() {
            tracing::error!(
                event_name = "system.http.request_failed",
                correlation_id = self.0.correlation_id(),
                error = %self.0,
                "request failed"
            );
        }
        let body = serde_json::json!({
            "error": message,
            "correlationId": self.0.correlation_id(),
        });
        (status, Json(body)).into_response()
    }
}

fn correlation_id(headers: &HeaderMap) -> String {
    ["x-request-id", "idempotency-key"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn required_header(headers: &HeaderMap, name: &str, correlation_id: &str) -> Result<String, ApiError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request(format!("missing {name} header"), correlation_id))
}

/// Cron-triggered endpoints require `Authorization: Bearer <ops.cron_secret>`. With no secret
/// configured they are disabled.
fn authorize_cron(
    headers: &HeaderMap,
    secret: Option<&SecretString>,
    correlation_id: &str,
) -> Result<(), ApiError> {
    let secret = secret.map(|secret| secret.expose_secret()).filter(|secret| !secret.is_empty());
    let Some(secret) = secret else {
        return Err(ApiError(InterfaceError::ServiceUnavailable {
            message: "ops.cron_secret is not configured".to_string(),
            correlation_id: correlation_id.to_string(),
        }));
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);
    match presented {
        Some(token) if token == secret => Ok(()),
        Some(_) => Err(ApiError::unauthorized("cron bearer token does not match", correlation_id)),
        None => Err(ApiError::unauthorized("missing cron bearer token", correlation_id)),
    }
}

fn parse_body<T: DeserializeOwned + Default>(body: &Bytes, correlation_id: &str) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|error| {
        ApiError::bad_request(format!("request body is not valid JSON: {error}"), correlation_id)
    })
}

async fn agent_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let correlation_id = correlation_id(&headers);
    let org_id = required_header(&headers, "x-org-id", &correlation_id)?;
    let user_id = required_header(&headers, "x-user-id", &correlation_id)?;

    let run = AgentRunRequest::from_json(&body)
        .and_then(|request| request.validate(&state.agent_config))
        .map_err(|error| ApiError::bad_request(error.to_string(), &correlation_id))?;

    let intent = run
        .prompt
        .latest_user_text()
        .map(|text| QueryIntent::classify(&text))
        .unwrap_or(QueryIntent::General);
    let context = RunContext { org_id: OrgId(org_id), user_id, correlation_id, intent };

    let (sender, receiver) = mpsc::channel(FRAME_BUFFER);
    let runner = Arc::clone(&state.runner);
    tokio::spawn(async move {
        runner.run(run, context, sender).await;
    });

    let stream = ReceiverStream::new(receiver)
        .map(|frame| Ok::<_, Infallible>(Event::default().data(frame.to_json())));
    let headers = [
        (header::CONTENT_TYPE, sse::CONTENT_TYPE),
        (header::CACHE_CONTROL, sse::CACHE_CONTROL),
        (header::CONNECTION, sse::CONNECTION),
    ];
    Ok((headers, Sse::new(stream)).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DealAutopilotBody {
    jurisdiction_id: Option<String>,
    materialize_tasks: Option<bool>,
}

async fn deal_autopilot(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let correlation_id = correlation_id(&headers);
    let org_id = required_header(&headers, "x-org-id", &correlation_id)?;
    let body: DealAutopilotBody = parse_body(&body, &correlation_id)?;

    let input = AutopilotRunInput {
        recommendation: RecommendationInput {
            org_id: OrgId(org_id),
            deal_id: DealId(deal_id),
            jurisdiction_id: body.jurisdiction_id,
        },
        materialize_tasks: body.materialize_tasks.unwrap_or(true),
    };
    let result = state
        .autopilot
        .run(&input)
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok(Json(result).into_response())
}

async fn autopilot_sweep(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let correlation_id = correlation_id(&headers);
    authorize_cron(&headers, state.cron_secret.as_ref(), &correlation_id)?;
    let input: SweepInput = parse_body(&body, &correlation_id)?;
    let result = state
        .autopilot
        .sweep(&input)
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok(Json(result).into_response())
}

async fn dispatch_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let correlation_id = correlation_id(&headers);
    let event: DomainEvent = serde_json::from_slice(&body).map_err(|error| {
        ApiError::bad_request(format!("invalid domain event: {error}"), &correlation_id)
    })?;

    tracing::info!(
        event_name = "automation.event.received",
        correlation_id = %correlation_id,
        event_type = event.event_type().as_str(),
        deal_id = %event.deal_id().0,
        "dispatching domain event"
    );
    let report = state.bus.dispatch(&event).await;
    Ok(Json(report).into_response())
}

async fn automation_health(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let correlation_id = correlation_id(&headers);
    let health = state
        .bus
        .handler_health()
        .await
        .map_err(|error| ApiError::from_application(error.into(), &correlation_id))?;
    Ok(Json(health).into_response())
}

async fn automation_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let correlation_id = correlation_id(&headers);
    let stats = state
        .bus
        .automation_stats()
        .await
        .map_err(|error| ApiError::from_application(error.into(), &correlation_id))?;
    Ok(Json(stats).into_response())
}

fn parse_required<T: DeserializeOwned>(body: &Bytes, correlation_id: &str) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|error| {
        ApiError::bad_request(format!("invalid request body: {error}"), correlation_id)
    })
}

#[derive(Debug, Deserialize)]
struct ScreeningBody {
    inputs: ScreeningInputs,
    playbook: Option<ScreeningPlaybook>,
}

async fn screen_deal(headers: HeaderMap, body: Bytes) -> Result<Response, ApiError> {
    let correlation_id = correlation_id(&headers);
    let body: ScreeningBody = parse_required(&body, &correlation_id)?;
    let playbook = body.playbook.unwrap_or_else(ScreeningPlaybook::standard);
    playbook
        .validate()
        .map_err(|error| ApiError::bad_request(error.to_string(), &correlation_id))?;

    let result = compute_screening(&playbook, &body.inputs);
    tracing::info!(
        event_name = "screening.computed",
        correlation_id = %correlation_id,
        provisional = result.scores.is_provisional,
        hard_filter_failed = result.scores.hard_filter_failed,
        "deal screened"
    );
    Ok(Json(result).into_response())
}

#[derive(Debug, Deserialize)]
struct ListingBody {
    scores: BTreeMap<String, f64>,
    weights: Option<BTreeMap<String, f64>>,
}

async fn score_listing(headers: HeaderMap, body: Bytes) -> Result<Response, ApiError> {
    let correlation_id = correlation_id(&headers);
    let body: ListingBody = parse_required(&body, &correlation_id)?;
    if let Some((key, _)) = body
        .weights
        .iter()
        .flatten()
        .find(|(_, weight)| !weight.is_finite() || **weight < 0.0)
    {
        return Err(ApiError::bad_request(
            format!("weight for `{key}` must be a non-negative number"),
            &correlation_id,
        ));
    }
    Ok(Json(compute_listing_score(&body.scores, body.weights.as_ref())).into_response())
}

#[derive(Debug, Deserialize)]
struct TriageBody {
    scores: DimensionScores,
    weights: Option<ScoringWeights>,
}

#[derive(Debug, Serialize)]
struct TriageResult {
    score: f64,
    decision: TriageDecision,
    weights: ScoringWeights,
}

async fn score_triage(headers: HeaderMap, body: Bytes) -> Result<Response, ApiError> {
    let correlation_id = correlation_id(&headers);
    let body: TriageBody = parse_required(&body, &correlation_id)?;
    let weights = body.weights.unwrap_or_default();
    weights
        .validate_weights()
        .map_err(|error| ApiError::bad_request(error.to_string(), &correlation_id))?;

    let score = triage_score(&body.scores, &weights);
    Ok(Json(TriageResult { score, decision: TriageDecision::from_score(score), weights })
        .into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use entops_agent::llm::{ModelRequest, ModelRun, ModelStreamEvent};
    use entops_agent::{ModelError, ModelRuntime};
    use entops_core::config::AppConfig;
    use entops_core::domain::deal::{Deal, DealId, DealStatus, OrgId};
    use entops_core::store::DealStore;
    use entops_db::{connect_with_settings, migrations, DbPool, SqlDealRepository};

    use super::router;
    use crate::bootstrap::build_state;

    struct CannedRuntime;

    #[async_trait]
    impl ModelRuntime for CannedRuntime {
        async fn run_streamed(&self, _request: ModelRequest) -> Result<ModelRun, ModelError> {
            let (sender, run) = ModelRun::channel();
            tokio::spawn(async move {
                let _ = sender.send(Ok(ModelStreamEvent::TextDelta("Zoned ".to_string()))).await;
                let _ = sender.send(Ok(ModelStreamEvent::TextDelta("M1.".to_string()))).await;
                let _ = sender
                    .send(Ok(ModelStreamEvent::Completed { final_output: "Zoned M1.".to_string() }))
                    .await;
            });
            Ok(run)
        }
    }

    const CRON_SECRET: &str = "cron-test-secret";

    async fn app() -> (Router, DbPool) {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrations");
        let mut config = AppConfig::default();
        config.ops.cron_secret = Some(CRON_SECRET.into());
        let state = build_state(&config, pool.clone(), Arc::new(CannedRuntime));
        (router(state), pool)
    }

    fn sweep_request(authorization: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/api/autopilot/sweep");
        if let Some(authorization) = authorization {
            builder = builder.header(header::AUTHORIZATION, authorization);
        }
        builder.body(Body::empty()).expect("request")
    }

    async fn seed_deal(pool: &DbPool, id: &str, status: DealStatus) {
        SqlDealRepository::new(pool.clone())
            .save(Deal {
                id: DealId(id.to_string()),
                org_id: OrgId("org-1".to_string()),
                name: format!("Deal {id}"),
                status,
                sku: Some("SMALL_BAY_FLEX".to_string()),
                jurisdiction_id: Some("ebr".to_string()),
            })
            .await
            .expect("seed deal");
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-org-id", "org-1")
            .header("x-user-id", "user-1")
            .header("x-request-id", "req-test")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn agent_run_streams_frames_ending_in_done() {
        let (app, _pool) = app().await;

        let response = app
            .oneshot(post("/api/agent/run", json!({"message": "What is the zoning?"})))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("text/event-stream")
        );
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).and_then(|v| v.to_str().ok()),
            Some("no-cache")
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let text = String::from_utf8(bytes.to_vec()).expect("utf8");
        let frames: Vec<Value> = text
            .split("\n\n")
            .filter_map(|block| block.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).expect("frame json"))
            .collect();

        let types: Vec<&str> = frames.iter().filter_map(|frame| frame["type"].as_str()).collect();
        assert_eq!(types, vec!["agent_switch", "text_delta", "text_delta", "done"]);
        assert_eq!(frames[3]["status"], "succeeded");
        assert_eq!(frames[3]["correlationId"], "req-test");
        assert!(frames[3]["conversationId"].is_string());
    }

    #[tokio::test]
    async fn agent_run_rejects_invalid_payload_with_correlation_id() {
        let (app, _pool) = app().await;

        let response = app
            .oneshot(post("/api/agent/run", json!({"message": "  "})))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["correlationId"], "req-test");
        assert!(body["error"].as_str().unwrap_or_default().contains("message or input"));
    }

    #[tokio::test]
    async fn agent_run_requires_caller_identity() {
        let (app, _pool) = app().await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/agent/run")
            .header("idempotency-key", "idem-1")
            .body(Body::from(json!({"message": "hi"}).to_string()))
            .expect("request");

        let response = app.oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["correlationId"], "idem-1");
    }

    #[tokio::test]
    async fn autopilot_for_unknown_deal_is_not_found() {
        let (app, _pool) = app().await;

        let response = app
            .oneshot(post("/api/deals/missing/autopilot", json!({})))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["correlationId"], "req-test");
    }

    #[tokio::test]
    async fn autopilot_without_history_holds() {
        let (app, pool) = app().await;
        seed_deal(&pool, "deal-1", DealStatus::Preapp).await;

        let response = app
            .oneshot(post("/api/deals/deal-1/autopilot", json!({"materializeTasks": true})))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["recommendation"]["status"], "hold");
        assert_eq!(body["recommendation"]["reasonCode"], "insufficient_kpi_samples");
        assert_eq!(body["skippedReason"], "recommendation_not_actionable");
        assert_eq!(body["createdTasks"], json!([]));
    }

    #[tokio::test]
    async fn sweep_accepts_empty_body() {
        let (app, pool) = app().await;
        seed_deal(&pool, "deal-1", DealStatus::Concept).await;
        seed_deal(&pool, "deal-2", DealStatus::Submitted).await;

        let bearer = format!("Bearer {CRON_SECRET}");
        let response = app.oneshot(sweep_request(Some(&bearer))).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["dealsScanned"], 1);
        assert_eq!(body["tasksCreated"], 0);
    }

    #[tokio::test]
    async fn sweep_rejects_missing_or_wrong_cron_token() {
        let (app, pool) = app().await;
        seed_deal(&pool, "deal-1", DealStatus::Concept).await;

        let missing = app.clone().oneshot(sweep_request(None)).await.expect("response");
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert!(json_body(missing).await["correlationId"].is_string());

        let wrong = app.oneshot(sweep_request(Some("Bearer not-the-secret"))).await.expect("response");
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn sweep_is_disabled_without_cron_secret() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrations");
        let app = router(build_state(&AppConfig::default(), pool, Arc::new(CannedRuntime)));

        let response =
            app.oneshot(sweep_request(Some("Bearer anything"))).await.expect("response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn dispatched_events_show_up_in_stats_and_health() {
        let (app, pool) = app().await;
        seed_deal(&pool, "deal-1", DealStatus::Concept).await;

        let response = app
            .clone()
            .oneshot(post(
                "/api/automation/events",
                json!({"type": "deal.statusChanged", "dealId": "deal-1",
                       "from": "PREAPP", "to": "CONCEPT", "orgId": "org-1"}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let report = json_body(response).await;
        assert_eq!(report["eventType"], "deal.statusChanged");
        assert_eq!(report["outcomes"][0]["status"], "completed");

        let stats = app
            .clone()
            .oneshot(Request::get("/api/automation/stats").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let stats = json_body(stats).await;
        assert_eq!(stats["totalToday"], 1);
        assert_eq!(stats["failuresToday"], 0);

        let health = app
            .oneshot(Request::get("/api/automation/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let health = json_body(health).await;
        assert_eq!(health.as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn malformed_event_is_rejected() {
        let (app, _pool) = app().await;
        let response = app
            .oneshot(post("/api/automation/events", json!({"type": "deal.exploded"})))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn screening_uses_the_standard_playbook_by_default() {
        let (app, _pool) = app().await;
        let inputs = json!({
            "price_basis": 10_000_000.0,
            "total_project_cost": 12_000_000.0,
            "square_feet": 100_000.0,
            "noi_in_place": 500_000.0,
            "noi_stabilized": 1_500_000.0,
            "tenant_credit_score": 3.0,
            "asset_condition_score": 3.0,
            "market_dynamics_score": 3.0
        });
        let response = app
            .oneshot(post("/api/screening", json!({"inputs": inputs})))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["scores"]["hard_filter_failed"], true);
        assert_eq!(body["scores"]["hard_filter_reasons"], json!(["dscr"]));
        assert_eq!(body["scores"]["is_provisional"], false);
        assert_eq!(body["metrics"]["cap_rate_used"], 0.15);
    }

    #[tokio::test]
    async fn screening_rejects_an_invalid_playbook() {
        let (app, _pool) = app().await;
        let response = app
            .oneshot(post(
                "/api/screening",
                json!({"inputs": {}, "playbook": {"debt_template": {"amort_years": 0}}}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["correlationId"], "req-test");
    }

    #[tokio::test]
    async fn listing_score_returns_tier() {
        let (app, _pool) = app().await;
        let scores = json!({
            "financial": 0.9, "location": 80, "utilities": 70,
            "zoning": 60, "market": 50, "risk": 100
        });
        let response = app
            .clone()
            .oneshot(post("/api/screening/listing", json!({"scores": scores})))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["total_score"], 76.5);
        assert_eq!(body["tier"], "B");

        let negative = app
            .oneshot(post(
                "/api/screening/listing",
                json!({"scores": scores, "weights": {"risk": -0.1}}),
            ))
            .await
            .expect("response");
        assert_eq!(negative.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn triage_scores_with_default_or_validated_weights() {
        let (app, _pool) = app().await;
        let scores = json!({
            "access": 80, "drainage": 80, "adjacency": 80, "environmental": 80,
            "utilities": 80, "politics": 80, "zoning": 80, "acreage": 80
        });
        let response = app
            .clone()
            .oneshot(post("/api/screening/triage", json!({"scores": scores})))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["score"], 80.0);
        assert_eq!(body["decision"], "ADVANCE");

        let lopsided = json!({
            "access": 0.9, "drainage": 0.01, "adjacency": 0.01, "environmental": 0.01,
            "utilities": 0.01, "politics": 0.02, "zoning": 0.02, "acreage": 0.02
        });
        let rejected = app
            .oneshot(post("/api/screening/triage", json!({"scores": scores, "weights": lopsided})))
            .await
            .expect("response");
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
    }
}
