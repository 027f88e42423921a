//! # Durable Flow
//!
//! A SQLite-backed durable execution engine: write workflows as
//! ordinary straight-line async Rust, get crash-safe replay for free.
//!
//! A workflow is any type implementing [`Flow`]. Its `body` calls a
//! series of *steps* through the [`FlowContext`] it is handed —
//! `ctx.step`, `ctx.step_delayed`, `ctx.await_signal` — and each call is
//! durably logged before it runs. On retry, completed steps are
//! replayed from the log instead of re-executed; an in-flight delayed
//! step resumes with whatever wait time remains; an await-step blocks
//! the whole flow until an external [`FlowHandle::signal`]/
//! [`FlowHandle::resume`] arrives.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                               │
//! │   get_flow / register_flow / recover_incomplete_flows        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              ▼               ▼               ▼
//! ┌────────────────────┐ ┌─────────────┐ ┌──────────────────────┐
//! │     FlowHandle<F>   │ │ LogStore    │ │ RendezvousRegistry    │
//! │  run/execute/resume │ │ (sqlite/mem)│ │ (process-local signal)│
//! └────────────────────┘ └─────────────┘ └──────────────────────┘
//!              │
//!              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       FlowContext                             │
//! │   step / step_delayed / await_signal — the dispatcher        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use durable_flow::prelude::*;
//!
//! #[derive(Default)]
//! struct HelloFlow;
//!
//! #[async_trait::async_trait]
//! impl Flow for HelloFlow {
//!     const TYPE: &'static str = "HelloFlow";
//!     type Input = String;
//!     type Output = ();
//!
//!     async fn body(&self, ctx: &FlowContext, name: String) -> Result<(), FlowError> {
//!         for i in 0..5 {
//!             ctx.step("Say", (name.clone(), i), |(name, i)| async move {
//!                 println!("{i}: hello {name}");
//!                 Ok::<_, std::convert::Infallible>(i)
//!             })
//!             .await?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let engine = Engine::in_memory();
//! let handle = engine.get_flow_default::<HelloFlow>(uuid::Uuid::new_v4());
//! handle.run("World".to_string()).await.unwrap();
//! ```

pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod flow;
pub mod handle;
pub mod model;
pub mod registry;
pub mod rendezvous;
pub mod store;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::dispatcher::FlowContext;
    pub use crate::engine::Engine;
    pub use crate::error::{DispatchError, EngineError, StoreError};
    pub use crate::flow::{Flow, FlowError};
    pub use crate::handle::FlowHandle;
    pub use crate::model::{CallMode, Invocation, InvocationStatus};
    pub use crate::registry::FlowRegistry;
    pub use crate::rendezvous::RendezvousRegistry;
    pub use crate::store::{InMemoryLogStore, LogStore, SqliteLogStore};
}

// Re-export key types at crate root.
pub use config::EngineConfig;
pub use dispatcher::FlowContext;
pub use engine::Engine;
pub use error::{DispatchError, EngineError, StoreError};
pub use flow::{Flow, FlowError};
pub use handle::FlowHandle;
pub use model::{CallMode, Invocation, InvocationStatus};
pub use registry::FlowRegistry;
pub use rendezvous::RendezvousRegistry;
pub use store::{InMemoryLogStore, LogStore, SqliteLogStore};
