//! The step dispatcher: decides replay/execute/wait/delay for every
//! intercepted step call.
//!
//! Rust has no runtime interface-proxy synthesis, so the call site is
//! explicit rather than reflective: workflow bodies call
//! [`FlowContext::step`], [`FlowContext::step_delayed`] and
//! [`FlowContext::await_signal`] directly. The same decision algorithm
//! drives those three entry points plus the flow-entry wrapper used
//! internally by `FlowHandle`.

use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{DispatchError, StoreError};
use crate::model::{CallMode, InvocationStatus};
use crate::rendezvous::RendezvousRegistry;
use crate::store::LogStore;

fn deserialize_or_null<R: DeserializeOwned>(v: Option<serde_json::Value>) -> Result<R, DispatchError> {
    let v = v.unwrap_or(serde_json::Value::Null);
    serde_json::from_value(v).map_err(StoreError::from).map_err(DispatchError::from)
}

/// `class_name`/`method_name` pair written for the step-0 entry row.
///
/// Kept constant across `run`/`execute`/`resume` so a resumed flow's
/// entry row never trips the structural-drift check against itself.
pub const ENTRY_METHOD: &str = "__flow_entry__";

/// Outcome of resolving a call against the log before the body runs.
enum Prepared<R> {
    /// The anchor row was already `Complete`; nothing to execute.
    Replayed(R),
    /// The body must run now, at this step number, with these arguments.
    Ready { step: i64, args: serde_json::Value },
}

/// Per-call dispatcher state, handed to a flow body as its `ctx`.
///
/// One `FlowContext` is built fresh for each top-level `run`/`execute`/
/// `resume` invocation; `current_step` is therefore local to that single
/// invocation and must never be shared across threads concurrently
/// running the same flow.
#[derive(Clone)]
pub struct FlowContext {
    pub(crate) flow_id: Uuid,
    pub(crate) class_name: &'static str,
    /// The mode in effect for the *next* dispatch on this context.
    ///
    /// A resumed invocation replays `Flow::body` from the top like any
    /// other dispatch, walking `current_step` forward one call at a
    /// time rather than jumping straight to the flow's latest logged
    /// row — the calls before the one actually `WaitingForSignal` are
    /// all `Complete` and replay normally regardless of mode. `Resume`
    /// is only consumed (flipped to `Run`) once the walk naturally
    /// reaches that waiting row and substitutes the rendezvous payload
    /// for it; every call after that point behaves like an ordinary
    /// `Run`. See DESIGN.md.
    mode: Arc<Mutex<CallMode>>,
    current_step: Arc<AtomicI64>,
    store: Arc<dyn LogStore>,
    rendezvous: Arc<RendezvousRegistry>,
}

impl FlowContext {
    pub(crate) fn new(
        flow_id: Uuid,
        class_name: &'static str,
        mode: CallMode,
        starting_step: i64,
        store: Arc<dyn LogStore>,
        rendezvous: Arc<RendezvousRegistry>,
    ) -> Self {
        Self {
            flow_id,
            class_name,
            mode: Arc::new(Mutex::new(mode)),
            current_step: Arc::new(AtomicI64::new(starting_step)),
            store,
            rendezvous,
        }
    }

    pub fn flow_id(&self) -> Uuid {
        self.flow_id
    }

    pub fn mode(&self) -> CallMode {
        *self.mode.lock()
    }

    /// An immediate (no declared delay) step.
    pub async fn step<A, R, E, F, Fut>(&self, method_name: &str, args: A, body: F) -> Result<R, DispatchError>
    where
        A: Serialize + DeserializeOwned + Clone + Send + Sync,
        R: Serialize + DeserializeOwned + Send,
        E: std::fmt::Display,
        F: FnOnce(A) -> Fut + Send,
        Fut: Future<Output = Result<R, E>> + Send,
    {
        match self.prepare::<A, R>(method_name, None, false, false, args).await? {
            Prepared::Replayed(r) => Ok(r),
            Prepared::Ready { step, args } => {
                let args: A = serde_json::from_value(args).map_err(StoreError::from)?;
                self.finish(step, body(args).await).await
            }
        }
    }

    /// A step that must wait at least `delay` between its first start
    /// timestamp and the actual body execution.
    pub async fn step_delayed<A, R, E, F, Fut>(
        &self,
        method_name: &str,
        delay: Duration,
        args: A,
        body: F,
    ) -> Result<R, DispatchError>
    where
        A: Serialize + DeserializeOwned + Clone + Send + Sync,
        R: Serialize + DeserializeOwned + Send,
        E: std::fmt::Display,
        F: FnOnce(A) -> Fut + Send,
        Fut: Future<Output = Result<R, E>> + Send,
    {
        match self.prepare::<A, R>(method_name, Some(delay), false, false, args).await? {
            Prepared::Replayed(r) => Ok(r),
            Prepared::Ready { step, args } => {
                let args: A = serde_json::from_value(args).map_err(StoreError::from)?;
                self.finish(step, body(args).await).await
            }
        }
    }

    /// An await-step: on first encounter it is logged `WaitingForSignal`
    /// and, in `Run` mode, pauses the flow with [`DispatchError::FlowPause`].
    /// `default` is returned unchanged until a resume substitutes the
    /// signalled payload for it.
    pub async fn await_signal<P>(&self, method_name: &str, default: P) -> Result<P, DispatchError>
    where
        P: Serialize + DeserializeOwned + Clone + Send + Sync,
    {
        match self.prepare::<P, P>(method_name, None, true, false, default).await? {
            Prepared::Replayed(r) => Ok(r),
            Prepared::Ready { step, args } => {
                let args: P = serde_json::from_value(args).map_err(StoreError::from)?;
                self.finish(step, Ok::<P, std::convert::Infallible>(args)).await
            }
        }
    }

    /// Entry point used internally by `FlowHandle` to dispatch the whole
    /// flow body as the step-0 row. Unlike [`FlowContext::step`], the
    /// body's error is already a [`DispatchError`] and is propagated
    /// unchanged — this is what lets [`DispatchError::FlowPause`] raised
    /// by a nested await-step bubble all the way up without being
    /// flattened into a generic failure.
    pub(crate) async fn dispatch_entry<I, O, F, Fut>(&self, input: I, body: F) -> Result<O, DispatchError>
    where
        I: Serialize + DeserializeOwned + Clone + Send + Sync,
        O: Serialize + DeserializeOwned + Send,
        F: FnOnce(I) -> Fut + Send,
        Fut: Future<Output = Result<O, DispatchError>> + Send,
    {
        match self.prepare::<I, O>(ENTRY_METHOD, None, false, true, input).await? {
            Prepared::Replayed(r) => Ok(r),
            Prepared::Ready { step, args } => {
                let args: I = serde_json::from_value(args).map_err(StoreError::from)?;
                let outcome = body(args).await;
                self.record_outcome(step, outcome).await
            }
        }
    }

    /// Steps 1-7 of the decision algorithm: anchor resolution,
    /// structural-drift check, replay short-circuit, retry-delay
    /// computation, the (possibly repeated) start write, the delay
    /// sleep, and the Run-mode pause.
    async fn prepare<A, R>(
        &self,
        method_name: &str,
        delay: Option<Duration>,
        is_await_step: bool,
        is_entry: bool,
        args: A,
    ) -> Result<Prepared<R>, DispatchError>
    where
        A: Serialize + DeserializeOwned + Clone + Send + Sync,
        R: DeserializeOwned,
    {
        // The mode captured for THIS call; may differ from what
        // `self.mode` holds once this call's own anchor resolution (the
        // `WaitingForSignal` arm below) consumes it for every later call
        // in the same invocation.
        let call_mode = self.mode();
        let step = if is_entry { 0 } else { self.current_step.load(Ordering::SeqCst) };

        // `Resume` does not jump to the flow's latest logged row here —
        // `Flow::body` is replayed from the top on every dispatch (Rust
        // has no reflection to call one specific step method directly),
        // so the anchor for step `S` is always the row at `(flow_id,
        // S)`. Steps before the one actually `WaitingForSignal` are all
        // `Complete` and replay below regardless of mode; the walk only
        // needs `Resume` once it reaches that row.
        let anchor = self.store.get_invocation(self.flow_id, step).await?;

        let mut effective_args = serde_json::to_value(&args).map_err(StoreError::from)?;
        let mut effective_delay = delay;

        if let Some(anchor) = &anchor {
            if anchor.class_name != self.class_name || anchor.method_name != method_name {
                return Err(DispatchError::StructuralDrift {
                    flow_id: self.flow_id,
                    step,
                    logged_class: anchor.class_name.clone(),
                    logged_method: anchor.method_name.clone(),
                    call_class: self.class_name.to_string(),
                    call_method: method_name.to_string(),
                });
            }

            match anchor.status {
                InvocationStatus::Complete => {
                    let ret = deserialize_or_null::<R>(anchor.return_value.clone())?;
                    self.current_step.store(step + 1, Ordering::SeqCst);
                    return Ok(Prepared::Replayed(ret));
                }
                InvocationStatus::WaitingForSignal if call_mode == CallMode::Resume => {
                    effective_args = self.rendezvous.wait(self.flow_id).await;
                    *self.mode.lock() = CallMode::Run;
                }
                _ => {
                    let now_ms = chrono::Utc::now().timestamp_millis();
                    let declared_ms = delay.map(|d| d.as_millis() as i64).unwrap_or(0);
                    let elapsed = now_ms - anchor.timestamp_ms;
                    let remaining = (declared_ms - elapsed).max(0);
                    effective_delay = Some(Duration::from_millis(remaining as u64));
                }
            }
        }

        let is_waiting = call_mode == CallMode::Await || (is_await_step && call_mode != CallMode::Resume);
        let log_status = if is_waiting { InvocationStatus::WaitingForSignal } else { InvocationStatus::Pending };

        self.store
            .log_invocation_start(
                self.flow_id,
                step,
                self.class_name,
                method_name,
                delay.map(|d| d.as_millis() as i64),
                log_status,
                Some(effective_args.clone()),
            )
            .await?;

        if let Some(d) = effective_delay {
            if !d.is_zero() {
                tokio::time::sleep(d).await;
            }
        }

        if is_await_step && call_mode == CallMode::Run {
            return Err(DispatchError::FlowPause);
        }

        if is_await_step && call_mode == CallMode::Await {
            effective_args = self.rendezvous.wait(self.flow_id).await;
        }

        Ok(Prepared::Ready { step, args: effective_args })
    }

    /// Step 8-9 for ordinary steps: body errors are stringified into
    /// [`DispatchError::UserStepFailure`] (no completion written).
    async fn finish<R, E>(&self, step: i64, outcome: Result<R, E>) -> Result<R, DispatchError>
    where
        R: Serialize + Send,
        E: std::fmt::Display,
    {
        self.record_outcome(step, outcome.map_err(|e| DispatchError::UserStepFailure(e.to_string()))).await
    }

    async fn record_outcome<R>(&self, step: i64, outcome: Result<R, DispatchError>) -> Result<R, DispatchError>
    where
        R: Serialize + Send,
    {
        match outcome {
            Ok(value) => {
                let return_value = serde_json::to_value(&value).map_err(StoreError::from)?;
                self.store.log_invocation_completion(self.flow_id, step, Some(return_value)).await?;
                self.current_step.store(step + 1, Ordering::SeqCst);
                if step == 0 {
                    self.rendezvous.release(self.flow_id);
                }
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryLogStore, SqliteLogStore};
    use std::sync::atomic::AtomicI64;

    fn ctx(store: Arc<dyn LogStore>) -> FlowContext {
        FlowContext::new(Uuid::new_v4(), "Test", CallMode::Run, 1, store, Arc::new(RendezvousRegistry::new()))
    }

    #[tokio::test]
    async fn replay_returns_stored_value_without_calling_body() {
        let ctx = ctx(Arc::new(InMemoryLogStore::new()));
        let calls = Arc::new(AtomicI64::new(0));

        let c = calls.clone();
        let first: i64 = ctx
            .step("Compute", 5i64, move |n| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok::<i64, std::convert::Infallible>(n * 2)
                }
            })
            .await
            .unwrap();
        assert_eq!(first, 10);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Re-dispatch the *same* step number on a fresh context sharing
        // the same store: the anchor is already Complete, so this must
        // replay without touching the body.
        let ctx2 = FlowContext::new(ctx.flow_id, "Test", CallMode::Run, 1, ctx.store.clone(), ctx.rendezvous.clone());
        let c = calls.clone();
        let second: i64 = ctx2
            .step("Compute", 999i64, move |n| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok::<i64, std::convert::Infallible>(n * 2)
                }
            })
            .await
            .unwrap();
        assert_eq!(second, 10, "replay must return the original return value, not a fresh computation");
        assert_eq!(calls.load(Ordering::SeqCst), 1, "body must not be called again on replay");
    }

    #[tokio::test]
    async fn structural_drift_rejects_a_different_method_name_at_the_same_step() {
        let ctx = ctx(Arc::new(InMemoryLogStore::new()));
        ctx.step("Original", (), |_: ()| async move { Ok::<(), std::convert::Infallible>(()) }).await.unwrap();

        let ctx2 = FlowContext::new(ctx.flow_id, "Test", CallMode::Run, 1, ctx.store.clone(), ctx.rendezvous.clone());
        let err = ctx2.step("Renamed", (), |_: ()| async move { Ok::<(), std::convert::Infallible>(()) }).await.unwrap_err();
        assert!(matches!(err, DispatchError::StructuralDrift { .. }));
    }

    #[tokio::test]
    async fn remaining_delay_accounts_for_time_already_elapsed() {
        // Uses a real clock-backed store (unlike InMemoryLogStore's
        // tick counter) so the retry-delay computation in `prepare`
        // exercises the same timestamp source it will see in
        // production.
        let store: Arc<dyn LogStore> = Arc::new(SqliteLogStore::connect("sqlite::memory:").await.unwrap());
        let ctx = ctx(store);

        ctx.store
            .log_invocation_start(ctx.flow_id, 1, "Test", "Wait", Some(200), InvocationStatus::Pending, Some(serde_json::json!(null)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        let started = std::time::Instant::now();
        let out: i64 = ctx
            .step_delayed("Wait", Duration::from_millis(200), (), |_: ()| async move { Ok::<i64, std::convert::Infallible>(1) })
            .await
            .unwrap();
        let elapsed = started.elapsed();
        assert_eq!(out, 1);
        assert!(elapsed < Duration::from_millis(180), "should wait only the ~80ms remainder, not the full 200ms, took {elapsed:?}");
    }

    #[tokio::test]
    async fn await_step_pauses_in_run_mode_and_leaves_the_row_waiting() {
        let store: Arc<dyn LogStore> = Arc::new(InMemoryLogStore::new());
        let ctx = ctx(store);
        let err = ctx.await_signal::<bool>("Confirm", false).await.unwrap_err();
        assert!(matches!(err, DispatchError::FlowPause));

        let row = ctx.store.get_invocation(ctx.flow_id, 1).await.unwrap().unwrap();
        assert_eq!(row.status, InvocationStatus::WaitingForSignal);
    }
}
