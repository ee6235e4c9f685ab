//! Client-facing error classification for agent runs. Raw failure text never reaches the
//! client when it describes a guardrail trip or a deployment misconfiguration.

use crate::sse::ErrorCode;

const GUARDRAIL_MARKERS: &[&str] =
    &["guardrail tripwire", "tripwire triggered", "input guardrail", "output guardrail"];

const SYSTEM_CONFIGURATION_MARKERS: &[&str] = &[
    "no such table",
    "no such column",
    "sqlite",
    "sqlx",
    "database is locked",
    "response_format",
    "json_schema",
    "invalid schema",
    "model endpoint is not configured",
];

pub const GUARDRAIL_MESSAGE: &str =
    "This request was blocked by a safety check. Rephrase the request and try again.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifiedError {
    pub message: String,
    pub code: Option<ErrorCode>,
}

pub fn classify_run_error(raw: &str, correlation_id: &str) -> ClassifiedError {
    let lowered = raw.to_lowercase();

    if GUARDRAIL_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        tracing::info!(
            event_name = "agent.run.guardrail_tripped",
            correlation_id,
            detail = raw,
            "guardrail blocked agent run"
        );
        return ClassifiedError {
            message: GUARDRAIL_MESSAGE.to_string(),
            code: Some(ErrorCode::GuardrailTripwire),
        };
    }

    if SYSTEM_CONFIGURATION_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        tracing::error!(
            event_name = "agent.run.system_configuration_error",
            correlation_id,
            detail = raw,
            "agent run failed on system configuration"
        );
        return ClassifiedError {
            message: format!(
                "The assistant is misconfigured. Contact your administrator with reference {correlation_id}."
            ),
            code: Some(ErrorCode::SystemConfigurationError),
        };
    }

    ClassifiedError { message: raw.to_string(), code: None }
}

#[cfg(test)]
mod tests {
    use super::{classify_run_error, GUARDRAIL_MESSAGE};
    use crate::sse::ErrorCode;

    #[test]
    fn guardrail_wording_variants_share_one_code() {
        for raw in [
            "Guardrail tripwire triggered: pii_detector",
            "InputGuardrail: input guardrail rejected prompt",
            "Output guardrail tripwire",
        ] {
            let classified = classify_run_error(raw, "req-1");
            assert_eq!(classified.code, Some(ErrorCode::GuardrailTripwire), "{raw}");
            assert_eq!(classified.message, GUARDRAIL_MESSAGE);
            assert!(!classified.message.contains("pii_detector"));
        }
    }

    #[test]
    fn configuration_failures_point_to_admin_with_reference() {
        let classified =
            classify_run_error("error returned from database: no such table: messages", "req-77");
        assert_eq!(classified.code, Some(ErrorCode::SystemConfigurationError));
        assert!(classified.message.contains("req-77"));
        assert!(!classified.message.contains("messages"));

        let schema = classify_run_error("400: Invalid schema for response_format 'plan'", "req-78");
        assert_eq!(schema.code, Some(ErrorCode::SystemConfigurationError));
    }

    #[test]
    fn other_failures_pass_through() {
        let classified = classify_run_error("upstream returned 429 Too Many Requests", "req-1");
        assert_eq!(classified.code, None);
        assert_eq!(classified.message, "upstream returned 429 Too Many Requests");
    }
}
