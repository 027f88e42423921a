//! Error kinds for the dispatcher, the log store and the engine.

use uuid::Uuid;

/// Errors raised while persisting or querying invocation rows.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying database is unreachable or returned an error.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// `logInvocationCompletion` targeted a row that does not exist.
    #[error("missing completion target: flow {flow_id} step {step}")]
    MissingCompletionTarget { flow_id: Uuid, step: i64 },

    /// The stored parameters/return value could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Errors surfaced by the step dispatcher.
///
/// Every variant here corresponds 1:1 to an error kind in the
/// dispatcher's decision algorithm; none of them are recovered locally —
/// they either propagate to the `FlowHandle` caller or are logged and
/// swallowed by the recovery scheduler.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A stored `(class_name, method_name)` disagrees with the live call.
    #[error("structural drift at flow {flow_id} step {step}: log has {logged_class}::{logged_method}, call site has {call_class}::{call_method}")]
    StructuralDrift {
        flow_id: Uuid,
        step: i64,
        logged_class: String,
        logged_method: String,
        call_class: String,
        call_method: String,
    },

    /// The log store failed on read or write.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// The user's step body raised an error.
    ///
    /// No completion is written; `attempts` is incremented on the next
    /// dispatch of the same `(flow_id, step)`.
    #[error("step failed: {0}")]
    UserStepFailure(String),

    /// The Flow Factory could not locate a concrete implementation.
    ///
    /// Unreachable through `Engine::get_flow`, which is monomorphized at
    /// compile time rather than resolved by reflection — kept as a
    /// variant so callers that build their own factory on top of
    /// `WorkflowRegistry` can still report it. See DESIGN.md.
    #[error("no implementation found for flow type {0}")]
    NoImplementation(String),

    /// An await-step was reached while in `Run` mode.
    ///
    /// This is expected control flow, not a user-visible failure; it is
    /// caught by `FlowHandle::run`/`run_async` and never escapes them.
    #[error("flow paused waiting for a signal")]
    FlowPause,
}

/// Errors from `Engine` construction and top-level operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("connect error: {0}")]
    Connect(#[from] sqlx::Error),
}
