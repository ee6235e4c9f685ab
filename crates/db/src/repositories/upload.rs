use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use entops_core::domain::deal::{DealId, OrgId};
use entops_core::domain::upload::{DocumentKind, Upload, UploadId};
use entops_core::errors::StoreError;
use entops_core::store::UploadStore;

use super::{decode_enum, RepositoryError};
use crate::DbPool;

pub struct SqlUploadRepository {
    pool: DbPool,
}

impl SqlUploadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UploadStore for SqlUploadRepository {
    async fn find(&self, id: &UploadId) -> Result<Option<Upload>, StoreError> {
        let row = sqlx::query("SELECT id, org_id, deal_id, filename, kind FROM uploads WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(row.map(upload_from_row).transpose()?)
    }

    async fn update_kind(&self, id: &UploadId, kind: DocumentKind) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE uploads SET kind = ? WHERE id = ?")
            .bind(kind.as_str())
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("upload {}", id.0)));
        }
        Ok(())
    }

    async fn save(&self, upload: Upload) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO uploads (id, org_id, deal_id, filename, kind)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                filename = excluded.filename,
                kind = excluded.kind",
        )
        .bind(&upload.id.0)
        .bind(&upload.org_id.0)
        .bind(&upload.deal_id.0)
        .bind(&upload.filename)
        .bind(upload.kind.as_str())
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }
}

fn upload_from_row(row: SqliteRow) -> Result<Upload, RepositoryError> {
    Ok(Upload {
        id: UploadId(row.try_get("id")?),
        org_id: OrgId(row.try_get("org_id")?),
        deal_id: DealId(row.try_get("deal_id")?),
        filename: row.try_get("filename")?,
        kind: decode_enum("kind", row.try_get("kind")?, DocumentKind::parse)?,
    })
}
