use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

use entops_core::domain::deal::{Deal, DealId, DealStatus, OrgId};
use entops_core::errors::StoreError;
use entops_core::store::DealStore;

use super::{decode_enum, encode_timestamp, RepositoryError};
use crate::DbPool;

const DEAL_COLUMNS: &str = "id, org_id, name, status, sku, jurisdiction_id";

pub struct SqlDealRepository {
    pool: DbPool,
}

impl SqlDealRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DealStore for SqlDealRepository {
    async fn find(&self, id: &DealId) -> Result<Option<Deal>, StoreError> {
        let row = sqlx::query(&format!("SELECT {DEAL_COLUMNS} FROM deals WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(row.map(deal_from_row).transpose()?)
    }

    async fn find_scoped(
        &self,
        id: &DealId,
        org_id: &OrgId,
        jurisdiction_id: Option<&str>,
    ) -> Result<Option<Deal>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {DEAL_COLUMNS}
             FROM deals
             WHERE id = ? AND org_id = ? AND (? IS NULL OR jurisdiction_id = ?)"
        ))
        .bind(&id.0)
        .bind(&org_id.0)
        .bind(jurisdiction_id)
        .bind(jurisdiction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(row.map(deal_from_row).transpose()?)
    }

    async fn list_by_status(
        &self,
        org_id: Option<&OrgId>,
        statuses: &[DealStatus],
        limit: u32,
    ) -> Result<Vec<Deal>, StoreError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {DEAL_COLUMNS} FROM deals WHERE status IN ("));
        let mut separated = builder.separated(", ");
        for status in statuses {
            separated.push_bind(status.as_str());
        }
        separated.push_unseparated(")");
        if let Some(org_id) = org_id {
            builder.push(" AND org_id = ").push_bind(org_id.0.clone());
        }
        builder.push(" ORDER BY id ASC LIMIT ").push_bind(i64::from(limit));

        let rows = builder.build().fetch_all(&self.pool).await.map_err(RepositoryError::from)?;
        Ok(rows.into_iter().map(deal_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn save(&self, deal: Deal) -> Result<(), StoreError> {
        let now = encode_timestamp(Utc::now());
        sqlx::query(
            "INSERT INTO deals (id, org_id, name, status, sku, jurisdiction_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                org_id = excluded.org_id,
                name = excluded.name,
                status = excluded.status,
                sku = excluded.sku,
                jurisdiction_id = excluded.jurisdiction_id,
                updated_at = excluded.updated_at",
        )
        .bind(&deal.id.0)
        .bind(&deal.org_id.0)
        .bind(&deal.name)
        .bind(deal.status.as_str())
        .bind(deal.sku.as_deref())
        .bind(deal.jurisdiction_id.as_deref())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }
}

fn deal_from_row(row: SqliteRow) -> Result<Deal, RepositoryError> {
    Ok(Deal {
        id: DealId(row.try_get("id")?),
        org_id: OrgId(row.try_get("org_id")?),
        name: row.try_get("name")?,
        status: decode_enum("status", row.try_get("status")?, DealStatus::parse)?,
        sku: row.try_get("sku")?,
        jurisdiction_id: row.try_get("jurisdiction_id")?,
    })
}

#[cfg(test)]
mod tests {
    use entops_core::domain::deal::{DealId, DealStatus, OrgId};
    use entops_core::store::DealStore;

    use super::SqlDealRepository;
    use crate::repositories::test_support::{sample_deal, setup_pool};

    #[tokio::test]
    async fn scoped_lookup_enforces_org_and_jurisdiction() {
        let pool = setup_pool().await;
        let repo = SqlDealRepository::new(pool.clone());
        let deal = sample_deal("deal-1", DealStatus::Preapp);
        repo.save(deal.clone()).await.expect("save");

        let org = OrgId("org-1".to_string());
        assert_eq!(repo.find_scoped(&deal.id, &org, None).await.expect("find"), Some(deal.clone()));
        assert_eq!(
            repo.find_scoped(&deal.id, &org, Some("ebr")).await.expect("find"),
            Some(deal.clone())
        );
        assert_eq!(repo.find_scoped(&deal.id, &org, Some("lafayette")).await.expect("find"), None);
        assert_eq!(
            repo.find_scoped(&deal.id, &OrgId("org-2".to_string()), None).await.expect("find"),
            None
        );
        pool.close().await;
    }

    #[tokio::test]
    async fn list_by_status_filters_and_limits() {
        let pool = setup_pool().await;
        let repo = SqlDealRepository::new(pool.clone());
        repo.save(sample_deal("deal-a", DealStatus::Preapp)).await.expect("save");
        repo.save(sample_deal("deal-b", DealStatus::Concept)).await.expect("save");
        repo.save(sample_deal("deal-c", DealStatus::Hearing)).await.expect("save");
        let mut other_org = sample_deal("deal-d", DealStatus::Preapp);
        other_org.org_id = OrgId("org-2".to_string());
        repo.save(other_org).await.expect("save");

        let org = OrgId("org-1".to_string());
        let listed = repo
            .list_by_status(Some(&org), &[DealStatus::Preapp, DealStatus::Concept], 10)
            .await
            .expect("list");
        let ids: Vec<DealId> = listed.into_iter().map(|deal| deal.id).collect();
        assert_eq!(ids, vec![DealId("deal-a".into()), DealId("deal-b".into())]);

        let limited =
            repo.list_by_status(None, &[DealStatus::Preapp], 1).await.expect("list limited");
        assert_eq!(limited.len(), 1);
        pool.close().await;
    }

    #[tokio::test]
    async fn save_updates_status_in_place() {
        let pool = setup_pool().await;
        let repo = SqlDealRepository::new(pool.clone());
        let mut deal = sample_deal("deal-1", DealStatus::Preapp);
        repo.save(deal.clone()).await.expect("save");
        deal.status = DealStatus::Concept;
        repo.save(deal.clone()).await.expect("update");

        assert_eq!(repo.find(&deal.id).await.expect("find"), Some(deal));
        pool.close().await;
    }
}
