//! The `Flow` trait and the error type its bodies return.

use crate::error::DispatchError;
use crate::dispatcher::FlowContext;

/// A durable workflow definition.
///
/// `TYPE` is the `class_name` written into every row this flow's steps
/// produce; it must be stable across deployments (structural drift is
/// keyed on it) and is usually just the type's own name.
///
/// `body` is dispatched once per `run`/`execute`/`resume` as the
/// step-0 row — a reserved entry row, with the flow's own steps
/// numbered starting at 1 (see DESIGN.md). Everything `body` does by
/// calling `ctx.step`/`ctx.step_delayed`/
/// `ctx.await_signal` is itself durable and replay-safe; `body` must
/// therefore be deterministic apart from those calls.
#[async_trait::async_trait]
pub trait Flow: Send + Sync + 'static {
    /// Stable identifier stored as `class_name` for this flow's steps.
    const TYPE: &'static str;

    /// Input to the flow, passed to `run`/`execute` and replayed as the
    /// step-0 row's parameters on every subsequent dispatch.
    type Input: serde::Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + 'static;

    /// The flow's final result, cached as the step-0 row's return value.
    type Output: serde::Serialize + serde::de::DeserializeOwned + Send + 'static;

    async fn body(&self, ctx: &FlowContext, input: Self::Input) -> Result<Self::Output, FlowError>;
}

/// An error raised from within a flow body.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// Bubbled up unchanged from a nested `ctx.step*`/`ctx.await_signal`
    /// call — including [`DispatchError::FlowPause`], which must reach
    /// `FlowHandle::run` undisturbed for pausing to work.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A terminal failure raised directly by the flow body itself,
    /// outside of any specific step call.
    #[error("flow failed: {0}")]
    Body(String),
}

impl FlowError {
    pub(crate) fn into_dispatch(self) -> DispatchError {
        match self {
            FlowError::Dispatch(d) => d,
            FlowError::Body(msg) => DispatchError::UserStepFailure(msg),
        }
    }

    /// `true` for a pause raised by an await-step reached in `Run` mode.
    pub fn is_pause(&self) -> bool {
        matches!(self, FlowError::Dispatch(DispatchError::FlowPause))
    }
}
