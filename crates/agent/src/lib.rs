//! Agent layer for entitlement operations.
//!
//! A run flows through four pieces:
//! 1. [`request`] validates the inbound payload and shapes conversation history.
//! 2. [`intent`] routes the query to a specialist profile, and [`coordinator`] assembles a
//!    fresh handoff graph for that profile from the immutable [`catalog`].
//! 3. [`runtime`] drives the [`llm::ModelRuntime`] stream and emits [`sse`] frames, with
//!    failures passed through [`guardrails::classify_run_error`].
//! 4. Post-run hooks fire detached once the `done` frame is out.

pub mod catalog;
pub mod coordinator;
pub mod guardrails;
pub mod intent;
pub mod llm;
pub mod request;
pub mod runtime;
pub mod sse;
pub mod tools;

pub use catalog::{AgentCatalog, AgentDefinition, AgentKey, COORDINATOR_NAME};
pub use coordinator::{create_configured_coordinator, create_intent_aware_coordinator};
pub use intent::QueryIntent;
pub use llm::{HttpModelRuntime, ModelError, ModelRuntime, UnconfiguredModelRuntime};
pub use request::{AgentRequestError, AgentRunRequest, ValidatedRun};
pub use runtime::{AgentRunner, CompletedRun, RunCompletionHook, RunContext};
pub use sse::{RunStatus, SseFrame};
