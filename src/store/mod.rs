//! The Log Store: durable persistence for invocation rows.

mod memory;
mod sqlite;

pub use memory::InMemoryLogStore;
pub use sqlite::SqliteLogStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{Invocation, InvocationStatus};

/// Durable append/update store for invocation rows, keyed by
/// `(flow_id, step)`.
///
/// Implementations must uphold these invariants: a row never
/// disappears except via [`LogStore::reset`]; `status = Complete` is
/// terminal; `class_name`/`method_name` are immutable after first start.
#[async_trait]
pub trait LogStore: Send + Sync + 'static {
    /// Point lookup by primary key.
    async fn get_invocation(&self, flow_id: Uuid, step: i64) -> Result<Option<Invocation>, StoreError>;

    /// The row with the highest `step` for this flow, if any.
    async fn get_latest_invocation(&self, flow_id: Uuid) -> Result<Option<Invocation>, StoreError>;

    /// Insert a new row at `attempts = 1`, or increment `attempts` on an
    /// existing one. All other columns are fixed at first-start values
    /// and must not change on a retry.
    #[allow(clippy::too_many_arguments)]
    async fn log_invocation_start(
        &self,
        flow_id: Uuid,
        step: i64,
        class_name: &str,
        method_name: &str,
        delay_ms: Option<i64>,
        status: InvocationStatus,
        parameters: Option<serde_json::Value>,
    ) -> Result<Invocation, StoreError>;

    /// Mark a row `Complete` with its return value.
    ///
    /// Fails with [`StoreError::MissingCompletionTarget`] if the row
    /// does not exist.
    async fn log_invocation_completion(
        &self,
        flow_id: Uuid,
        step: i64,
        return_value: Option<serde_json::Value>,
    ) -> Result<Invocation, StoreError>;

    /// All `step = 0` rows with `status != Complete`, oldest first.
    async fn get_incomplete_flows(&self) -> Result<Vec<Invocation>, StoreError>;

    /// Administrative/test-only: drop and recreate the backing table.
    async fn reset(&self) -> Result<(), StoreError>;
}
