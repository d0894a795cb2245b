//! Context Window Management
//!
//! Chooses which recent turns of a session are sent to the runtime and
//! bounds how much history a session keeps.

use crate::memory::store::Session;
use crate::models::{ChatMessage, MessageRole};
use tracing::debug;

/// Configuration for context window management
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Token budget for history sent to the runtime
    pub max_context_tokens: usize,
    /// Most messages sent to the runtime
    pub preserve_recent_count: usize,
    /// Most messages a session keeps between turns
    pub max_stored_messages: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 6_000,
            preserve_recent_count: 40,
            max_stored_messages: 200,
        }
    }
}

pub struct ContextManager {
    config: ContextConfig,
}

impl ContextManager {
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
        }
    }

    pub fn with_config(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Percentage of the token budget the whole session would use
    pub fn get_context_usage_percent(&self, session: &Session) -> f32 {
        (session.total_tokens() as f32 / self.config.max_context_tokens as f32) * 100.0
    }

    /// Most recent messages that fit the budget, starting at a user message.
    /// The latest user turn is always included even when it alone exceeds the budget.
    pub fn prepare_context(&self, session: &Session) -> Vec<ChatMessage> {
        let messages: Vec<&ChatMessage> = session.messages().collect();

        let mut start = messages.len();
        let mut tokens = 0;
        while start > 0 {
            let candidate = messages[start - 1];
            if messages.len() - start >= self.config.preserve_recent_count
                || tokens + candidate.token_count > self.config.max_context_tokens
            {
                break;
            }
            tokens += candidate.token_count;
            start -= 1;
        }

        let aligned = (start..messages.len())
            .find(|&i| messages[i].role == MessageRole::User)
            .or_else(|| messages.iter().rposition(|m| m.role == MessageRole::User));
        let start = aligned.unwrap_or(start);

        debug!(
            session_id = %session.session_id,
            sent = messages.len() - start,
            stored = messages.len(),
            usage_percent = self.get_context_usage_percent(session),
            "Prepared runtime context"
        );

        messages[start..].iter().map(|m| (*m).clone()).collect()
    }

    /// Drop old turns once the session grows past the storage limit
    pub fn compact(&self, session: &mut Session) {
        if session.message_count() > self.config.max_stored_messages {
            debug!(
                session_id = %session.session_id,
                stored = session.message_count(),
                "Compacting session history"
            );
            session.trim_to_recent(self.config.max_stored_messages);
        }
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new()
    }
}
