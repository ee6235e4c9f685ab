use std::path::PathBuf;

use entops_core::automation::is_migration_safe;
use entops_core::config::AppConfig;
use entops_db::{connect_with_config, migrations};
use serde_json::json;

use crate::commands::check_migration::DESTRUCTIVE_EXIT_CODE;
use crate::commands::{load_options, CommandResult};

enum MigrateFailure {
    Step { error_class: &'static str, message: String, exit_code: u8 },
    Destructive(Vec<serde_json::Value>),
}

/// Applies pending migrations after gating each one through the destructive-statement scan.
pub fn run(config_path: Option<PathBuf>, allow_destructive: bool) -> CommandResult {
    let config = match AppConfig::load(load_options(config_path)) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                6,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database).await.map_err(|error| {
            MigrateFailure::Step { error_class: "db_connectivity", message: error.to_string(), exit_code: 4 }
        })?;

        let pending = migrations::pending(&pool).await.map_err(|error| MigrateFailure::Step {
            error_class: "migration",
            message: error.to_string(),
            exit_code: 5,
        })?;

        let flagged: Vec<serde_json::Value> = pending
            .iter()
            .filter_map(|migration| {
                let safety = is_migration_safe(&migration.sql);
                (!safety.safe).then(|| {
                    json!({
                        "version": migration.version,
                        "description": migration.description,
                        "destructiveOperations": safety.destructive_operations,
                    })
                })
            })
            .collect();
        if !flagged.is_empty() && !allow_destructive {
            pool.close().await;
            return Err(MigrateFailure::Destructive(flagged));
        }

        migrations::run_pending(&pool).await.map_err(|error| MigrateFailure::Step {
            error_class: "migration",
            message: error.to_string(),
            exit_code: 5,
        })?;
        pool.close().await;
        Ok((pending.len(), flagged))
    });

    match result {
        Ok((applied, flagged)) => CommandResult::success_with(
            "migrate",
            format!("applied {applied} pending migration(s)"),
            Some(json!({ "applied": applied, "destructiveAllowed": flagged })),
        ),
        Err(MigrateFailure::Destructive(flagged)) => CommandResult::failure_with(
            "migrate",
            "destructive_migration",
            "pending migrations contain destructive operations; rerun with --allow-destructive",
            DESTRUCTIVE_EXIT_CODE,
            Some(json!({ "flagged": flagged })),
        ),
        Err(MigrateFailure::Step { error_class, message, exit_code }) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
