use std::collections::HashSet;

use sqlx::migrate::{Migrate, MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// An embedded up-migration not yet recorded as applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingMigration {
    pub version: i64,
    pub description: String,
    pub sql: String,
}

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Up-migrations that `run_pending` would apply, in version order.
pub async fn pending(pool: &DbPool) -> Result<Vec<PendingMigration>, MigrateError> {
    let mut conn = pool.acquire().await?;
    conn.ensure_migrations_table().await?;
    let applied: HashSet<i64> =
        conn.list_applied_migrations().await?.into_iter().map(|migration| migration.version).collect();

    Ok(MIGRATOR
        .iter()
        .filter(|migration| migration.migration_type.is_up_migration())
        .filter(|migration| !applied.contains(&migration.version))
        .map(|migration| PendingMigration {
            version: migration.version,
            description: migration.description.to_string(),
            sql: migration.sql.to_string(),
        })
        .collect())
}
