use std::path::Path;

use entops_core::automation::is_migration_safe;

use crate::commands::CommandResult;

pub const DESTRUCTIVE_EXIT_CODE: u8 = 3;

/// Scans one SQL file for destructive statements.
pub fn run(path: &Path) -> CommandResult {
    let sql = match std::fs::read_to_string(path) {
        Ok(sql) => sql,
        Err(error) => {
            return CommandResult::failure(
                "check-migration",
                "io",
                format!("could not read `{}`: {error}", path.display()),
                2,
            );
        }
    };

    let safety = is_migration_safe(&sql);
    let details = serde_json::to_value(&safety).ok();
    if safety.safe {
        CommandResult::success_with(
            "check-migration",
            format!("`{}` is additive", path.display()),
            details,
        )
    } else {
        CommandResult::failure_with(
            "check-migration",
            "destructive_migration",
            format!(
                "`{}` contains destructive operations: {}",
                path.display(),
                safety.destructive_operations.join(", ")
            ),
            DESTRUCTIVE_EXIT_CODE,
            details,
        )
    }
}
