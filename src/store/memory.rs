//! In-memory `LogStore`, used by unit tests and doctests.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{Invocation, InvocationStatus};

use super::LogStore;

/// A `DashMap`-backed store with no durability across process restarts.
///
/// Rows are keyed by `(flow_id, step)` the same way the SQLite store is;
/// this exists purely so dispatcher and flow-handle tests don't need a
/// database file.
#[derive(Debug, Default)]
pub struct InMemoryLogStore {
    rows: DashMap<(Uuid, i64), Invocation>,
    clock: Mutex<i64>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic millisecond clock, independent of the wall clock, so
    /// tests can assert ordering without sleeping.
    fn tick(&self) -> i64 {
        let mut c = self.clock.lock();
        *c += 1;
        *c
    }
}

#[async_trait]
impl LogStore for InMemoryLogStore {
    async fn get_invocation(&self, flow_id: Uuid, step: i64) -> Result<Option<Invocation>, StoreError> {
        Ok(self.rows.get(&(flow_id, step)).map(|r| r.clone()))
    }

    async fn get_latest_invocation(&self, flow_id: Uuid) -> Result<Option<Invocation>, StoreError> {
        Ok(self
            .rows
            .iter()
            .filter(|r| r.key().0 == flow_id)
            .map(|r| r.value().clone())
            .max_by_key(|i| i.step))
    }

    async fn log_invocation_start(
        &self,
        flow_id: Uuid,
        step: i64,
        class_name: &str,
        method_name: &str,
        delay_ms: Option<i64>,
        status: InvocationStatus,
        parameters: Option<serde_json::Value>,
    ) -> Result<Invocation, StoreError> {
        let timestamp_ms = self.tick();
        let mut entry = self.rows.entry((flow_id, step)).or_insert_with(|| Invocation {
            flow_id,
            step,
            timestamp_ms,
            class_name: class_name.to_string(),
            method_name: method_name.to_string(),
            delay_ms,
            status,
            attempts: 0,
            parameters: parameters.clone(),
            return_value: None,
        });
        entry.attempts += 1;
        Ok(entry.clone())
    }

    async fn log_invocation_completion(
        &self,
        flow_id: Uuid,
        step: i64,
        return_value: Option<serde_json::Value>,
    ) -> Result<Invocation, StoreError> {
        let mut row = self
            .rows
            .get_mut(&(flow_id, step))
            .ok_or(StoreError::MissingCompletionTarget { flow_id, step })?;
        row.status = InvocationStatus::Complete;
        row.return_value = return_value;
        Ok(row.clone())
    }

    async fn get_incomplete_flows(&self) -> Result<Vec<Invocation>, StoreError> {
        let mut rows: Vec<Invocation> = self
            .rows
            .iter()
            .filter(|r| r.key().1 == 0 && r.value().status != InvocationStatus::Complete)
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by_key(|i| i.timestamp_ms);
        Ok(rows)
    }

    async fn reset(&self) -> Result<(), StoreError> {
        self.rows.clear();
        Ok(())
    }
}
