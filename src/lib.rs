//! Personal Finance Tracker Agent
//!
//! A conversational expense tracker that:
//! - Records expenses written in plain language into a local CSV ledger
//! - Corrects the last expense or one picked by matching fields
//! - Reports spending by month, category, sub category and account
//! - Talks through a terminal REPL or a Telegram webhook
//!
//! REQUEST LOOP:
//! USER TEXT → RUNTIME → TOOL CALLS → LEDGER / REPORTS → RUNTIME → ANSWER

pub mod agent;
pub mod args;
pub mod clock;
pub mod config;
pub mod error;
pub mod execution;
pub mod interface;
pub mod ledger;
pub mod memory;
pub mod models;
pub mod prompts;
pub mod report;
pub mod runtime;
pub mod taxonomy;
pub mod tools;

pub use error::{FinanceError, Result};

// Re-export common types
pub use agent::FinanceAgent;
pub use ledger::Ledger;
pub use models::*;
