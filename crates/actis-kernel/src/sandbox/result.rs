//! ExecutionResult: the structured outcome of one sandboxed run.
//!
//! Every run produces one, whatever happened. The status says how the run
//! ended; stdout and stderr hold everything captured up to that point.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::interpreter::{Fault, TurnSignal};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Raised,
    TimedOut,
    ResourceExceeded,
    Denied,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Raised => "raised",
            ExecutionStatus::TimedOut => "timed_out",
            ExecutionStatus::ResourceExceeded => "resource_exceeded",
            ExecutionStatus::Denied => "denied",
        })
    }
}

/// Resources consumed by a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Highest estimated size of live values plus pending allocations.
    pub peak_memory_bytes: usize,
    /// Statements, loop iterations and calls executed.
    pub steps: u64,
    pub capability_calls: u64,
}

/// A result returned by an `io` or `stateful` capability, for the caller's
/// short-term state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub capability: String,
    pub result: serde_json::Value,
    pub timestamp_utc: DateTime<Utc>,
    pub turn_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,
    /// The script's `result` variable, only for completed runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returned_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<Fault>,
    #[serde(rename = "wall_time_ms", with = "millis")]
    pub wall_time: Duration,
    pub resource_usage: ResourceUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<TurnSignal>,
    #[serde(default)]
    pub state_updates: Vec<StateUpdate>,
}

impl ExecutionResult {
    pub fn is_completed(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
