//! The `Engine`: an explicit, constructible entry point binding a
//! store, a rendezvous registry, and a flow registry.
//!
//! Binds a [`LogStore`], a [`RendezvousRegistry`] and a [`FlowRegistry`]
//! together and exposes the flow factory and recovery scheduler
//! operations. One `Engine` value per store handle — nothing here
//! requires it to be a process-wide singleton.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::flow::Flow;
use crate::handle::FlowHandle;
use crate::rendezvous::RendezvousRegistry;
use crate::registry::FlowRegistry;
use crate::store::{LogStore, SqliteLogStore};

/// The durable execution engine: one store, one rendezvous registry,
/// one recovery-time flow registry.
///
/// Cloning an `Engine` is cheap — every field is an `Arc` — and two
/// clones share the same store, rendezvous slots and registered flow
/// types, so handing a clone to a background task is the normal way to
/// let it call [`Engine::recover_incomplete_flows`] or
/// [`Engine::get_flow`] concurrently with the rest of the program.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn LogStore>,
    rendezvous: Arc<RendezvousRegistry>,
    registry: Arc<parking_lot::RwLock<FlowRegistry>>,
}

impl Engine {
    /// Wrap an already-constructed store. Used by tests and by
    /// [`Engine::connect`] once migrations have run.
    pub fn with_store(store: Arc<dyn LogStore>) -> Self {
        Self {
            store,
            rendezvous: Arc::new(RendezvousRegistry::new()),
            registry: Arc::new(parking_lot::RwLock::new(FlowRegistry::new())),
        }
    }

    /// Convenience constructor backed by an in-process, non-durable
    /// store. Useful for tests and quick demos that don't need a real
    /// database.
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(crate::store::InMemoryLogStore::new()))
    }

    /// Connect to `config.connection_string` and run migrations.
    ///
    /// Deliberately does **not** act on `config.recover_on_startup`
    /// itself: recovery looks up each incomplete row's `class_name` in
    /// the [`FlowRegistry`] (see [`Engine::recover_incomplete_flows`]),
    /// and that registry starts empty — it can only be populated by
    /// [`Engine::register_flow`] calls made on the `Engine` value this
    /// method returns. Running recovery here, before the caller has had
    /// a chance to register anything, would find every incomplete flow
    /// unrecognized and recover nothing. Call [`Engine::register_flow`]
    /// for every flow type this process hosts, then call
    /// [`Engine::recover_incomplete_flows`] yourself — or use
    /// [`Engine::connect_with`], which sequences both steps correctly.
    pub async fn connect(config: EngineConfig) -> Result<Self, EngineError> {
        let store = SqliteLogStore::connect(&config.connection_string).await?;
        Ok(Self::with_store(Arc::new(store)))
    }

    /// [`Engine::connect`], then `register` (typically one or more
    /// [`Engine::register_flow`] calls), then — only if
    /// `config.recover_on_startup` is set — [`Engine::recover_incomplete_flows`].
    ///
    /// This is the ordering `recover_on_startup` assumes: registration
    /// must land in the [`FlowRegistry`] before recovery scans for
    /// incomplete flows to reconstruct by `class_name`.
    pub async fn connect_with(config: EngineConfig, register: impl FnOnce(&Engine)) -> Result<Self, EngineError> {
        let engine = Self::connect(config.clone()).await?;
        register(&engine);
        if config.recover_on_startup {
            engine.recover_incomplete_flows().await;
        }
        Ok(engine)
    }

    /// Register `F` so that [`Engine::recover_incomplete_flows`] can
    /// reconstruct it by its `class_name` after a crash. `make` builds
    /// a fresh flow instance; it is invoked once per recovered flow.
    pub fn register_flow<F>(&self, make: impl Fn() -> F + Send + Sync + 'static)
    where
        F: Flow,
    {
        self.registry.write().register(make);
    }

    /// Binds a flow instance to `flow_id` and returns a handle. Rust
    /// generics pin `F` to a concrete type at compile time, so there is
    /// no "locate a concrete implementation" step to perform here —
    /// [`crate::error::DispatchError::NoImplementation`] is unreachable
    /// through this path; see DESIGN.md.
    pub fn get_flow<F: Flow>(&self, flow_id: Uuid, flow: F) -> FlowHandle<F> {
        FlowHandle::new(flow_id, Arc::new(flow), self.store.clone(), self.rendezvous.clone())
    }

    /// Same as [`Engine::get_flow`], but builds `F` with its `Default`
    /// impl — the common case for flows with no injected dependencies,
    /// matching how `demos/hello_flow.rs` and `demos/signup_flow.rs`
    /// construct theirs.
    pub fn get_flow_default<F: Flow + Default>(&self, flow_id: Uuid) -> FlowHandle<F> {
        self.get_flow(flow_id, F::default())
    }

    pub fn store(&self) -> &Arc<dyn LogStore> {
        &self.store
    }

    /// Queries `get_incomplete_flows`, and for each `step = 0` row whose
    /// `class_name` is registered, reconstructs and re-drives the flow
    /// on its own task. Failures are logged via `tracing::error!` and
    /// do not stop the rest of recovery. Idempotent — a row that
    /// completes (or re-pauses) during one call is simply absent from
    /// `get_incomplete_flows` on the next.
    pub async fn recover_incomplete_flows(&self) {
        let pending = match self.store.get_incomplete_flows().await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "recovery scan failed");
                return;
            }
        };

        tracing::info!(count = pending.len(), "recovering incomplete flows");

        for row in pending {
            let registry = self.registry.read();
            let Some(fut) = registry.recover(&row.class_name, row.flow_id, self.store.clone(), self.rendezvous.clone()) else {
                tracing::warn!(flow_id = %row.flow_id, class_name = %row.class_name, "no registered flow for recovery");
                continue;
            };
            drop(registry);
            tokio::spawn(fut);
        }
    }
}
