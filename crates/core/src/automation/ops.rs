//! Operational guardrails: destructive-migration detection, configuration health, alert
//! thresholds.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

const DESTRUCTIVE_PATTERNS: [(&str, &str); 9] = [
    ("DROP TABLE", r"(?is)\bdrop\s+table\b"),
    ("DROP SCHEMA", r"(?is)\bdrop\s+schema\b"),
    ("DROP DATABASE", r"(?is)\bdrop\s+database\b"),
    ("DROP INDEX", r"(?is)\bdrop\s+index\b"),
    ("DROP TYPE", r"(?is)\bdrop\s+type\b"),
    ("TRUNCATE", r"(?is)\btruncate\b"),
    ("ALTER TABLE DROP COLUMN", r"(?is)\balter\s+table\b[^;]*?\bdrop\s+column\b"),
    ("ALTER TABLE DROP CONSTRAINT", r"(?is)\balter\s+table\b[^;]*?\bdrop\s+constraint\b"),
    ("DELETE FROM", r"(?is)\bdelete\s+from\b"),
];

fn destructive_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        DESTRUCTIVE_PATTERNS
            .iter()
            .filter_map(|(name, pattern)| Regex::new(pattern).ok().map(|regex| (*name, regex)))
            .collect()
    })
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSafety {
    pub safe: bool,
    pub destructive_operations: Vec<String>,
}

/// Static scan for destructive statements. Reports every matching operation, not only the
/// first. Matches inside comments or string literals are reported too.
pub fn is_migration_safe(sql: &str) -> MigrationSafety {
    let destructive_operations: Vec<String> = destructive_patterns()
        .iter()
        .filter(|(_, regex)| regex.is_match(sql))
        .map(|(name, _)| (*name).to_string())
        .collect();

    MigrationSafety { safe: destructive_operations.is_empty(), destructive_operations }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpsHealthStatus {
    Ok,
    Degraded,
    Down,
}

impl OpsHealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Degraded => "degraded",
            Self::Down => "down",
        }
    }
}

/// Presence of the five critical settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CriticalSettings {
    pub database_url: bool,
    pub llm_api_key: bool,
    pub storage_url: bool,
    pub cron_secret: bool,
    pub error_reporting_dsn: bool,
}

impl CriticalSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let present = |value: Option<&String>| value.map(|v| !v.trim().is_empty()).unwrap_or(false);
        Self {
            database_url: !config.database.url.trim().is_empty(),
            llm_api_key: config.llm.resolve_endpoint().is_some(),
            storage_url: present(config.ops.storage_url.as_ref()),
            cron_secret: config.ops.has_cron_secret(),
            error_reporting_dsn: present(config.ops.error_reporting_dsn.as_ref()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigHealth {
    pub status: OpsHealthStatus,
    pub missing: Vec<String>,
}

/// `down` when an essential setting (database, model key) is missing, `degraded` when any
/// other critical setting is missing.
pub fn evaluate_health(settings: &CriticalSettings) -> ConfigHealth {
    let essential = [("DATABASE_URL", settings.database_url), ("LLM_API_KEY", settings.llm_api_key)];
    let critical = [
        ("STORAGE_URL", settings.storage_url),
        ("CRON_SECRET", settings.cron_secret),
        ("ERROR_REPORTING_DSN", settings.error_reporting_dsn),
    ];

    let missing_essential: Vec<String> =
        essential.iter().filter(|(_, present)| !present).map(|(name, _)| name.to_string()).collect();
    let missing_critical: Vec<String> =
        critical.iter().filter(|(_, present)| !present).map(|(name, _)| name.to_string()).collect();

    let status = if !missing_essential.is_empty() {
        OpsHealthStatus::Down
    } else if !missing_critical.is_empty() {
        OpsHealthStatus::Degraded
    } else {
        OpsHealthStatus::Ok
    };

    ConfigHealth { status, missing: missing_essential.into_iter().chain(missing_critical).collect() }
}

pub fn should_alert_on_failure(consecutive_failures: u32, threshold: u32) -> bool {
    consecutive_failures >= threshold
}

#[cfg(test)]
mod tests {
    use super::{
        destructive_patterns, evaluate_health, is_migration_safe, should_alert_on_failure,
        CriticalSettings, OpsHealthStatus, DESTRUCTIVE_PATTERNS,
    };

    #[test]
    fn every_destructive_pattern_compiles() {
        assert_eq!(destructive_patterns().len(), DESTRUCTIVE_PATTERNS.len());
    }

    #[test]
    fn each_destructive_statement_is_flagged_case_insensitively() {
        let cases = [
            ("DROP TABLE deals;", "DROP TABLE"),
            ("drop schema legacy cascade;", "DROP SCHEMA"),
            ("Drop Database entops;", "DROP DATABASE"),
            ("DROP INDEX idx_tasks_deal;", "DROP INDEX"),
            ("drop type deal_status;", "DROP TYPE"),
            ("TRUNCATE automation_events;", "TRUNCATE"),
            ("ALTER TABLE deals DROP COLUMN sku;", "ALTER TABLE DROP COLUMN"),
            ("alter table tasks\n  drop constraint tasks_deal_fk;", "ALTER TABLE DROP CONSTRAINT"),
            ("DELETE FROM uploads WHERE kind = 'other';", "DELETE FROM"),
        ];

        for (sql, operation) in cases {
            let result = is_migration_safe(sql);
            assert!(!result.safe, "{sql} should be unsafe");
            assert!(result.destructive_operations.iter().any(|op| op == operation), "{sql}");
        }
    }

    #[test]
    fn multi_statement_migration_reports_all_operations() {
        let result = is_migration_safe(
            "DROP TABLE old_deals;\nTRUNCATE tasks;\nALTER TABLE deals DROP COLUMN notes;",
        );
        assert_eq!(
            result.destructive_operations,
            vec!["DROP TABLE", "TRUNCATE", "ALTER TABLE DROP COLUMN"]
        );
    }

    #[test]
    fn additive_migrations_are_safe() {
        for sql in [
            "",
            "CREATE TABLE parcels (id TEXT PRIMARY KEY);",
            "CREATE INDEX idx_parcels_deal ON parcels(deal_id);",
            "ALTER TABLE deals ADD COLUMN sku TEXT;",
            "INSERT INTO deals (id) VALUES ('d1'); UPDATE deals SET name = 'x';",
            "ALTER TYPE deal_status ADD VALUE 'EXIT_MARKETED';",
        ] {
            assert!(is_migration_safe(sql).safe, "{sql} should be safe");
        }
    }

    #[test]
    fn health_is_down_without_essentials_and_degraded_without_optional() {
        let all = CriticalSettings {
            database_url: true,
            llm_api_key: true,
            storage_url: true,
            cron_secret: true,
            error_reporting_dsn: true,
        };
        assert_eq!(evaluate_health(&all).status, OpsHealthStatus::Ok);

        let degraded = CriticalSettings { cron_secret: false, ..all };
        let report = evaluate_health(&degraded);
        assert_eq!(report.status, OpsHealthStatus::Degraded);
        assert_eq!(report.missing, vec!["CRON_SECRET"]);

        let down = CriticalSettings { llm_api_key: false, storage_url: false, ..all };
        let report = evaluate_health(&down);
        assert_eq!(report.status, OpsHealthStatus::Down);
        assert_eq!(report.missing, vec!["LLM_API_KEY", "STORAGE_URL"]);
    }

    #[test]
    fn alerting_is_a_monotonic_threshold() {
        for threshold in 1..=5 {
            for failures in 0..=10 {
                assert_eq!(should_alert_on_failure(failures, threshold), failures >= threshold);
            }
        }
    }
}
