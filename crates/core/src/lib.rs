pub mod automation;
pub mod autopilot;
pub mod config;
pub mod domain;
pub mod errors;
pub mod retry;
pub mod scoring;
pub mod store;

pub use automation::{
    standard_bus, AutomationBus, AutomationHandler, DispatchReport, DomainEvent, DomainEventType,
    HandlerError,
};
pub use autopilot::{
    AutopilotRunInput, AutopilotRunResult, EntitlementStrategyAutopilot,
    EntitlementStrategyAutopilotRecommendation, ReasonCode, RecommendationInput,
    RecommendationStatus, SweepInput, SweepResult,
};
pub use domain::deal::{Deal, DealId, DealStatus, OrgId};
pub use domain::task::{NewTask, Task, TaskId, TaskStatus};
pub use errors::{ApplicationError, DomainError, InterfaceError, StoreError};
pub use retry::{with_timeout_and_retry, RetryError, RetryPolicy};
