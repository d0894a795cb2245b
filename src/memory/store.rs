//! Per-conversation session state
//!
//! A session is owned by its interface (one for the terminal, one per
//! Telegram chat) and passed to the agent on every turn.

use crate::models::{ChatMessage, MessageRole};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use uuid::Uuid;

/// Conversation of one user with the agent
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    messages: VecDeque<ChatMessage>,
    /// Total token count (approximate)
    total_tokens: usize,
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(session_id: Uuid) -> Self {
        Self {
            session_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            messages: VecDeque::new(),
            total_tokens: 0,
        }
    }

    pub fn add_message(&mut self, message: ChatMessage) {
        self.total_tokens += message.token_count;
        self.messages.push_back(message);
        self.updated_at = Utc::now();
    }

    pub fn messages(&self) -> impl DoubleEndedIterator<Item = &ChatMessage> + ExactSizeIterator {
        self.messages.iter()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop the oldest messages until at most `keep_count` remain. The result
    /// always starts at a user message, so a tool result never loses the call
    /// that produced it.
    pub fn trim_to_recent(&mut self, keep_count: usize) {
        if self.messages.len() <= keep_count {
            return;
        }

        while self.messages.len() > keep_count {
            self.messages.pop_front();
        }
        while self
            .messages
            .front()
            .is_some_and(|m| m.role != MessageRole::User)
        {
            self.messages.pop_front();
        }

        self.recompute_total_tokens();
        self.updated_at = Utc::now();
    }

    /// Recompute token count (prevents drift)
    fn recompute_total_tokens(&mut self) {
        self.total_tokens = self.messages.iter().map(|m| m.token_count).sum();
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.total_tokens = 0;
        self.updated_at = Utc::now();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
