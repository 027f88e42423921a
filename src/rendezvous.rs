//! The rendezvous registry: a process-local, per-flow single-slot signal.
//!
//! A one-shot payload-carrying permit per flow, built from a `Notify`
//! plus a mutex-guarded slot (see DESIGN.md).

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use uuid::Uuid;

/// A single-slot signal: one permit, one carried payload.
///
/// Repeated `signal` calls before the permit is consumed overwrite the
/// payload and do not accumulate permits beyond one.
struct Slot {
    notify: Notify,
    payload: Mutex<Option<serde_json::Value>>,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            notify: Notify::new(),
            payload: Mutex::new(None),
        }
    }
}

/// Process-local map from `flow_id` to its rendezvous slot.
///
/// Not persisted: if the process restarts while a flow is waiting, the
/// flow is discoverable via `LogStore::get_incomplete_flows` and a fresh
/// signal must be delivered after restart.
#[derive(Default)]
pub struct RendezvousRegistry {
    slots: DashMap<Uuid, Arc<Slot>>,
}

impl RendezvousRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, flow_id: Uuid) -> Arc<Slot> {
        self.slots.entry(flow_id).or_default().clone()
    }

    /// Deliver a payload and release one permit. Idempotent: a second
    /// signal before the first is consumed just overwrites the payload.
    pub fn signal(&self, flow_id: Uuid, payload: serde_json::Value) {
        let slot = self.slot(flow_id);
        *slot.payload.lock() = Some(payload);
        slot.notify.notify_one();
    }

    /// Block until a permit is available, consume it, and return the
    /// payload that was current at that moment.
    pub async fn wait(&self, flow_id: Uuid) -> serde_json::Value {
        let slot = self.slot(flow_id);
        loop {
            if let Some(payload) = slot.payload.lock().take() {
                return payload;
            }
            slot.notify.notified().await;
        }
    }

    /// Remove the entry for a flow. Called when the flow reaches
    /// `status = Complete` at step 0.
    pub fn release(&self, flow_id: Uuid) {
        self.slots.remove(&flow_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_then_wait_delivers_payload() {
        let reg = RendezvousRegistry::new();
        let flow_id = Uuid::new_v4();
        reg.signal(flow_id, serde_json::json!("hello"));
        let payload = reg.wait(flow_id).await;
        assert_eq!(payload, serde_json::json!("hello"));
    }

    #[tokio::test]
    async fn repeated_signals_do_not_accumulate_permits() {
        let reg = RendezvousRegistry::new();
        let flow_id = Uuid::new_v4();
        reg.signal(flow_id, serde_json::json!(1));
        reg.signal(flow_id, serde_json::json!(2));

        let payload = reg.wait(flow_id).await;
        assert_eq!(payload, serde_json::json!(2));

        // A second wait blocks: race it against a short timeout.
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(50), reg.wait(flow_id))
            .await
            .is_err();
        assert!(timed_out);
    }

    #[tokio::test]
    async fn release_drops_the_slot() {
        let reg = RendezvousRegistry::new();
        let flow_id = Uuid::new_v4();
        reg.signal(flow_id, serde_json::json!(null));
        reg.release(flow_id);
        assert!(!reg.slots.contains_key(&flow_id));
    }
}
