pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_config, connect_with_settings, ping, DbPool};
pub use migrations::PendingMigration;
pub use repositories::{
    RepositoryError, SqlAutomationEventRepository, SqlConversationRepository, SqlDealRepository,
    SqlEntitlementAnalytics, SqlTaskRepository, SqlUploadRepository,
};
