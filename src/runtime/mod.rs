//! Agent runtime boundary
//!
//! The runtime is the external tool-calling model. Given the conversation so
//! far and the tool descriptors, it either answers or asks for tool calls.

use crate::error::FinanceError;
use crate::models::{ChatMessage, RuntimeReply, ToolSpec};
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

pub mod openai;
pub use openai::OpenAiRuntime;

/// One step of the external model
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn next_step(
        &self,
        conversation: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<RuntimeReply>;
}

/// A scripted step: a reply, or an upstream failure with this message
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Reply(RuntimeReply),
    Fail(String),
}

/// Deterministic runtime that plays back a fixed list of steps.
/// Useful for tests and offline runs; every conversation it receives is kept.
#[derive(Default)]
pub struct ScriptedRuntime {
    steps: Mutex<VecDeque<ScriptStep>>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedRuntime {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Steps not played yet
    pub fn remaining(&self) -> usize {
        self.steps.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Conversations received so far, one per `next_step` call
    pub fn conversations(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    async fn next_step(
        &self,
        conversation: &[ChatMessage],
        _tools: &[ToolSpec],
    ) -> Result<RuntimeReply> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(conversation.to_vec());
        }

        let step = self
            .steps
            .lock()
            .map_err(|_| FinanceError::Upstream("scripted runtime lock poisoned".to_string()))?
            .pop_front();

        match step {
            Some(ScriptStep::Reply(reply)) => Ok(reply),
            Some(ScriptStep::Fail(message)) => Err(FinanceError::Upstream(message)),
            None => Err(FinanceError::Upstream(
                "scripted runtime has no more steps".to_string(),
            )),
        }
    }
}
