//! Type-erased flow registry used by the recovery scheduler.
//!
//! A map from a stable type name to a boxed factory, so
//! `Engine::recover_incomplete_flows` can reconstruct a flow it has
//! never seen the concrete type of, keyed only by the `class_name`
//! string recorded in the log.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use uuid::Uuid;

use crate::flow::Flow;
use crate::handle::FlowHandle;
use crate::rendezvous::RendezvousRegistry;
use crate::store::LogStore;

type RecoveryFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type RecoveryFactory = Box<dyn Fn(Uuid, Arc<dyn LogStore>, Arc<RendezvousRegistry>) -> RecoveryFuture + Send + Sync>;

/// Maps `class_name` to a closure that rebuilds the matching
/// `FlowHandle<F>` and drives it forward from its logged state.
///
/// There is no hard failure surfaced for an unrecognized type: an
/// unregistered `class_name` found by `get_incomplete_flows` is logged
/// and skipped rather than treated as fatal, since one process may
/// only host a subset of a deployment's flow types (see DESIGN.md).
#[derive(Default)]
pub struct FlowRegistry {
    factories: HashMap<&'static str, RecoveryFactory>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `F`, using `make` to build a fresh instance whenever a
    /// `(class_name, step=0)` row for `F::TYPE` is found incomplete at
    /// startup. `make` is called once per recovered flow, not once per
    /// registry — it exists because `F` may carry injected
    /// dependencies (an HTTP client, a mailer) that the registry itself
    /// has no business constructing.
    pub fn register<F>(&mut self, make: impl Fn() -> F + Send + Sync + 'static)
    where
        F: Flow,
    {
        let make = Arc::new(make);
        let factory: RecoveryFactory = Box::new(move |flow_id, store, rendezvous| {
            let make = make.clone();
            Box::pin(async move {
                let flow = Arc::new((make)());
                let handle: FlowHandle<F> = FlowHandle::new(flow_id, flow, store, rendezvous);
                match handle.resume_without_signal().await {
                    Ok(_) => {}
                    Err(e) if e.is_pause() => {}
                    Err(e) => {
                        tracing::error!(%flow_id, flow_type = F::TYPE, error = %e, "recovered flow failed");
                    }
                }
            })
        });
        self.factories.insert(F::TYPE, factory);
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.factories.contains_key(class_name)
    }

    pub(crate) fn recover(
        &self,
        class_name: &str,
        flow_id: Uuid,
        store: Arc<dyn LogStore>,
        rendezvous: Arc<RendezvousRegistry>,
    ) -> Option<RecoveryFuture> {
        self.factories.get(class_name).map(|f| f(flow_id, store, rendezvous))
    }
}

impl std::fmt::Debug for FlowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRegistry")
            .field("flow_types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
