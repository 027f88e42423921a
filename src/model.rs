//! Core data model: the invocation row and its status lifecycle.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a single `(flow_id, step)` invocation row.
///
/// `Complete` is terminal. `WaitingForSignal` may only transition to
/// `Complete` (on a successful resume) or remain on retry with no signal
/// delivered yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Pending,
    WaitingForSignal,
    Complete,
}

impl InvocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::WaitingForSignal => "waiting_for_signal",
            Self::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "waiting_for_signal" => Some(Self::WaitingForSignal),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

impl std::fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The durable log row for one intercepted step call.
///
/// Primary key is `(flow_id, step)`. `step = 0` is always the flow entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub flow_id: Uuid,
    pub step: i64,
    pub timestamp_ms: i64,
    pub class_name: String,
    pub method_name: String,
    pub delay_ms: Option<i64>,
    pub status: InvocationStatus,
    pub attempts: i64,
    pub parameters: Option<serde_json::Value>,
    pub return_value: Option<serde_json::Value>,
}

/// The dispatcher-ambient reason a user invoked the flow proxy.
///
/// `Run` is the normal caller-driven path. `Resume` follows a delivered
/// signal. `Await` is used internally when an await-step blocks on its
/// own rendezvous slot rather than pausing the whole flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    Run,
    Resume,
    Await,
}
