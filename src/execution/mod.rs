//! Execution engine for runtime-requested tool calls
//!
//! The runtime decides which tools to call; this is the only place they run.
//! A failed call is recorded and reported back, it never aborts the batch.

use crate::models::{
    ExecutionStatus, Observation, ToolCall, ToolErrorKind, ToolOutput, ToolSpec,
};
use crate::tools::ToolRegistry;
use chrono::Utc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Maximum tool calls accepted from a single runtime reply
const MAX_CALLS_PER_REPLY: usize = 16;

/// Runs tool calls in the order the runtime requested them
pub struct ExecutionEngine {
    tool_registry: ToolRegistry,
}

impl ExecutionEngine {
    pub fn new(tool_registry: ToolRegistry) -> Self {
        Self { tool_registry }
    }

    /// Tool descriptions offered to the runtime
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tool_registry.specs()
    }

    /// Execute every call in order and record one observation per call.
    /// Calls past the per-reply limit are answered with an error, not run.
    pub async fn execute_calls(&self, calls: &[ToolCall]) -> Vec<Observation> {
        let mut observations = Vec::with_capacity(calls.len());

        if calls.len() > MAX_CALLS_PER_REPLY {
            warn!(
                requested = calls.len(),
                limit = MAX_CALLS_PER_REPLY,
                "Too many tool calls in one reply"
            );
        }

        for (index, call) in calls.iter().enumerate() {
            debug!(call_id = %call.id, tool_name = %call.name, "Executing tool call");

            let start = Instant::now();
            let tool_output = if index < MAX_CALLS_PER_REPLY {
                self.tool_registry
                    .invoke(&call.name, call.arguments.clone())
                    .await
            } else {
                ToolOutput::failure(
                    ToolErrorKind::Validation,
                    format!(
                        "at most {} tool calls are executed per step",
                        MAX_CALLS_PER_REPLY
                    ),
                )
            };
            let execution_time_ms = start.elapsed().as_millis() as u64;

            let status = if tool_output.success {
                ExecutionStatus::Success
            } else {
                ExecutionStatus::Failed
            };

            if status == ExecutionStatus::Failed {
                warn!(
                    call_id = %call.id,
                    tool_name = %call.name,
                    error = ?tool_output.error,
                    "Tool call failed, reporting to runtime"
                );
            }

            observations.push(Observation {
                observation_id: Uuid::new_v4(),
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                tool_input: call.arguments.clone(),
                tool_output,
                execution_time_ms,
                created_at: Utc::now(),
                status,
            });
        }

        debug!(observation_count = observations.len(), "Tool calls completed");

        observations
    }
}
