//! The Flow Handle: a caller's bound reference to one running flow.

use std::sync::Arc;

use uuid::Uuid;

use crate::dispatcher::FlowContext;
use crate::error::DispatchError;
use crate::flow::{Flow, FlowError};
use crate::model::CallMode;
use crate::rendezvous::RendezvousRegistry;
use crate::store::LogStore;

/// A handle bound to one `flow_id` and one [`Flow`] implementation.
///
/// Obtained from [`crate::Engine::get_flow`] — monomorphized at compile
/// time here rather than resolved by reflection, since Rust generics
/// already pin `F` to a concrete type.
pub struct FlowHandle<F: Flow> {
    flow_id: Uuid,
    flow: Arc<F>,
    store: Arc<dyn LogStore>,
    rendezvous: Arc<RendezvousRegistry>,
}

impl<F: Flow> Clone for FlowHandle<F> {
    fn clone(&self) -> Self {
        Self {
            flow_id: self.flow_id,
            flow: self.flow.clone(),
            store: self.store.clone(),
            rendezvous: self.rendezvous.clone(),
        }
    }
}

impl<F: Flow> FlowHandle<F> {
    pub(crate) fn new(flow_id: Uuid, flow: Arc<F>, store: Arc<dyn LogStore>, rendezvous: Arc<RendezvousRegistry>) -> Self {
        Self { flow_id, flow, store, rendezvous }
    }

    pub fn id(&self) -> Uuid {
        self.flow_id
    }

    /// Run to completion or to the first pause, swallowing
    /// [`DispatchError::FlowPause`]: a flow that reaches an unanswered
    /// `await_signal` simply returns `Ok(())`, to be continued later by
    /// [`FlowHandle::resume`].
    pub async fn run(&self, input: F::Input) -> Result<(), FlowError> {
        match self.invoke(CallMode::Run, input).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_pause() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Like [`FlowHandle::run`], but returns the flow's output and does
    /// NOT swallow a pause — callers that need the result in hand must
    /// treat `FlowError::Dispatch(DispatchError::FlowPause)` as "not
    /// finished yet" themselves.
    pub async fn execute(&self, input: F::Input) -> Result<F::Output, FlowError> {
        self.invoke(CallMode::Run, input).await
    }

    /// Spawn [`FlowHandle::run`] on a background task.
    pub fn run_async(&self, input: F::Input) -> tokio::task::JoinHandle<Result<(), FlowError>>
    where
        F::Input: Send + 'static,
    {
        let handle = self.clone();
        tokio::spawn(async move { handle.run(input).await })
    }

    /// Spawn [`FlowHandle::execute`] on a background task.
    pub fn execute_async(&self, input: F::Input) -> tokio::task::JoinHandle<Result<F::Output, FlowError>>
    where
        F::Input: Send + 'static,
    {
        let handle = self.clone();
        tokio::spawn(async move { handle.execute(input).await })
    }

    /// Deliver a payload to a flow waiting on `ctx.await_signal` and
    /// continue it from wherever its log says it left off.
    ///
    /// Works whether or not this process instance is the one that
    /// originally paused the flow: the rendezvous payload only needs to
    /// be delivered to *some* in-process waiter, but the log lookup that
    /// drives `resume` itself is store-backed, so a flow whose await-step
    /// is still `WaitingForSignal` after a restart can be resumed once a
    /// fresh signal arrives post-restart.
    pub async fn resume(&self, payload: serde_json::Value) -> Result<F::Output, FlowError> {
        self.rendezvous.signal(self.flow_id, payload);
        self.resume_without_signal().await
    }

    /// Continue a flow from its latest logged row without delivering a
    /// new signal — used by the recovery scheduler to carry a `Pending`
    /// (not `WaitingForSignal`) flow forward after a restart.
    pub(crate) async fn resume_without_signal(&self) -> Result<F::Output, FlowError> {
        let entry = self
            .store
            .get_invocation(self.flow_id, 0)
            .await
            .map_err(DispatchError::from)?
            .ok_or_else(|| DispatchError::NoImplementation(format!("no entry row for flow {}", self.flow_id)))?;

        let input: F::Input = entry
            .parameters
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .map_err(crate::error::StoreError::from)
            .map_err(DispatchError::from)?
            .ok_or_else(|| DispatchError::NoImplementation(format!("flow {} entry row has no stored input", self.flow_id)))?;

        self.invoke(CallMode::Resume, input).await
    }

    /// Deliver a signal without touching the log at all — useful in
    /// tests that drive an `await_signal` step directly in `Await` mode.
    pub fn signal(&self, payload: serde_json::Value) {
        self.rendezvous.signal(self.flow_id, payload);
    }

    async fn invoke(&self, mode: CallMode, input: F::Input) -> Result<F::Output, FlowError> {
        let ctx = FlowContext::new(self.flow_id, F::TYPE, mode, 1, self.store.clone(), self.rendezvous.clone());
        let flow = self.flow.clone();
        let body_ctx = ctx.clone();
        ctx.dispatch_entry(input, move |input| async move { flow.body(&body_ctx, input).await.map_err(FlowError::into_dispatch) })
            .await
            .map_err(FlowError::from)
    }
}
