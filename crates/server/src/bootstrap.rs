use std::sync::Arc;

use async_trait::async_trait;
use entops_agent::{
    AgentCatalog, AgentRunner, CompletedRun, HttpModelRuntime, ModelRuntime, RunCompletionHook,
    UnconfiguredModelRuntime,
};
use entops_core::automation::{standard_bus, CriticalSettings};
use entops_core::config::{AppConfig, ConfigError, LoadOptions};
use entops_core::errors::ApplicationError;
use entops_core::EntitlementStrategyAutopilot;
use entops_db::{
    connect_with_config, migrations, DbPool, SqlAutomationEventRepository,
    SqlConversationRepository, SqlDealRepository, SqlEntitlementAnalytics, SqlTaskRepository,
    SqlUploadRepository,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::routes::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let model: Arc<dyn ModelRuntime> = match HttpModelRuntime::from_config(&config.llm) {
        Some(runtime) => Arc::new(runtime),
        None => {
            warn!(
                event_name = "system.bootstrap.model_unconfigured",
                correlation_id = "bootstrap",
                "no model endpoint configured; agent runs will fail until one is set"
            );
            Arc::new(UnconfiguredModelRuntime)
        }
    };

    let state = build_state(&config, db_pool.clone(), model);
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        handlers = ?state.bus.handler_names(),
        "application state assembled"
    );

    Ok(Application { config, db_pool, state })
}

/// Wires SQL repositories into the bus, autopilot and agent runner.
pub fn build_state(config: &AppConfig, db_pool: DbPool, model: Arc<dyn ModelRuntime>) -> AppState {
    let deals = Arc::new(SqlDealRepository::new(db_pool.clone()));
    let tasks = Arc::new(SqlTaskRepository::new(db_pool.clone()));
    let uploads = Arc::new(SqlUploadRepository::new(db_pool.clone()));
    let events = Arc::new(SqlAutomationEventRepository::new(db_pool.clone()));
    let conversations = Arc::new(SqlConversationRepository::new(db_pool.clone()));
    let analytics = Arc::new(SqlEntitlementAnalytics::new(db_pool.clone()));

    let bus = standard_bus(events, deals.clone(), tasks.clone(), uploads, &config.automation);
    let autopilot = EntitlementStrategyAutopilot::new(
        deals.clone(),
        tasks,
        analytics,
        config.autopilot.clone(),
    );
    let runner = AgentRunner::new(
        conversations,
        deals,
        model,
        AgentCatalog::new(&config.llm.flagship_model, &config.llm.standard_model),
        config.agent.clone(),
    )
    .with_hook(Arc::new(RunAuditHook));

    AppState {
        db_pool,
        bus: Arc::new(bus),
        autopilot: Arc::new(autopilot),
        runner: Arc::new(runner),
        agent_config: config.agent.clone(),
        critical_settings: CriticalSettings::from_config(config),
        cron_secret: config.ops.cron_secret.clone(),
    }
}

/// Records a structured summary of every completed run.
struct RunAuditHook;

#[async_trait]
impl RunCompletionHook for RunAuditHook {
    fn name(&self) -> &'static str {
        "run_audit"
    }

    async fn on_run_completed(&self, run: &CompletedRun) -> Result<(), ApplicationError> {
        info!(
            event_name = "agent.run.audit",
            run_id = %run.run_id,
            org_id = %run.org_id.0,
            deal_id = run.deal_id.as_ref().map(|id| id.0.as_str()).unwrap_or_default(),
            conversation_id = run.conversation_id.as_ref().map(|id| id.0.as_str()).unwrap_or_default(),
            agent_name = %run.agent_name,
            output_chars = run.output.len(),
            "agent run recorded"
        );
        Ok(())
    }
}
