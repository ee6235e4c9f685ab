use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use entops_core::autopilot::analytics::{kpi_snapshot, lookback_cutoff, predict_strategies};
use entops_core::domain::deal::OrgId;
use entops_core::domain::strategy::{
    AnalyticsQuery, KpiSnapshot, StrategyOutcomeRecord, StrategyPrediction,
};
use entops_core::errors::StoreError;
use entops_core::store::EntitlementAnalytics;

use super::{encode_timestamp, parse_timestamp, RepositoryError};
use crate::DbPool;

/// Strategy analytics over the `entitlement_strategy_outcomes` table. Scoping happens in SQL;
/// aggregation reuses the core functions.
pub struct SqlEntitlementAnalytics {
    pool: DbPool,
}

impl SqlEntitlementAnalytics {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, record: &StrategyOutcomeRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO entitlement_strategy_outcomes (
                id, org_id, jurisdiction_id, sku, strategy_key, strategy_label, approved,
                days_to_decision, predicted_probability, predicted_days_p50, decided_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&record.org_id.0)
        .bind(record.jurisdiction_id.as_deref())
        .bind(record.sku.as_deref())
        .bind(&record.strategy_key)
        .bind(&record.strategy_label)
        .bind(record.approved)
        .bind(record.days_to_decision)
        .bind(record.predicted_probability)
        .bind(record.predicted_days_p50)
        .bind(encode_timestamp(record.decided_at))
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }

    async fn scoped(&self, query: &AnalyticsQuery) -> Result<Vec<StrategyOutcomeRecord>, StoreError> {
        let cutoff = lookback_cutoff(Utc::now(), query.lookback_months);
        let rows = sqlx::query(
            "SELECT org_id, jurisdiction_id, sku, strategy_key, strategy_label, approved,
                    days_to_decision, predicted_probability, predicted_days_p50, decided_at
             FROM entitlement_strategy_outcomes
             WHERE org_id = ?
               AND (? IS NULL OR jurisdiction_id = ?)
               AND (? IS NULL OR sku = ?)
               AND decided_at >= ?
             ORDER BY decided_at DESC
             LIMIT ?",
        )
        .bind(&query.org_id.0)
        .bind(query.jurisdiction_id.as_deref())
        .bind(query.jurisdiction_id.as_deref())
        .bind(query.sku.as_deref())
        .bind(query.sku.as_deref())
        .bind(encode_timestamp(cutoff))
        .bind(i64::from(query.record_limit))
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(rows.into_iter().map(outcome_from_row).collect::<Result<Vec<_>, _>>()?)
    }
}

#[async_trait]
impl EntitlementAnalytics for SqlEntitlementAnalytics {
    async fn strategy_predictions(
        &self,
        query: &AnalyticsQuery,
    ) -> Result<Vec<StrategyPrediction>, StoreError> {
        Ok(predict_strategies(&self.scoped(query).await?))
    }

    async fn kpi_snapshot(&self, query: &AnalyticsQuery) -> Result<KpiSnapshot, StoreError> {
        Ok(kpi_snapshot(&self.scoped(query).await?))
    }
}

fn outcome_from_row(row: SqliteRow) -> Result<StrategyOutcomeRecord, RepositoryError> {
    Ok(StrategyOutcomeRecord {
        org_id: OrgId(row.try_get("org_id")?),
        jurisdiction_id: row.try_get("jurisdiction_id")?,
        sku: row.try_get("sku")?,
        strategy_key: row.try_get("strategy_key")?,
        strategy_label: row.try_get("strategy_label")?,
        approved: row.try_get("approved")?,
        days_to_decision: row.try_get("days_to_decision")?,
        predicted_probability: row.try_get("predicted_probability")?,
        predicted_days_p50: row.try_get("predicted_days_p50")?,
        decided_at: parse_timestamp("decided_at", row.try_get("decided_at")?)?,
    })
}
