//! SQLite implementations of the `entops-core` persistence ports.

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use entops_core::errors::StoreError;

pub mod analytics;
pub mod automation_event;
pub mod conversation;
pub mod deal;
pub mod task;
pub mod upload;

pub use analytics::SqlEntitlementAnalytics;
pub use automation_event::SqlAutomationEventRepository;
pub use conversation::SqlConversationRepository;
pub use deal::SqlDealRepository;
pub use task::SqlTaskRepository;
pub use upload::SqlUploadRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(sqlx::Error::RowNotFound) => {
                StoreError::NotFound("row not found".to_string())
            }
            RepositoryError::Database(error) => StoreError::Backend(error.to_string()),
            RepositoryError::Decode(message) => StoreError::Decode(message),
        }
    }
}

/// Fixed-width UTC encoding so stored timestamps compare correctly as text.
pub(crate) fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn decode_enum<T>(
    column: &str,
    raw: String,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<T, RepositoryError> {
    parse(&raw).ok_or_else(|| RepositoryError::Decode(format!("unknown value in `{column}`: `{raw}`")))
}
