//! Error types for the finance tracker agent

use thiserror::Error;

/// Result type alias for finance tracker operations
pub type Result<T> = std::result::Result<T, FinanceError>;

#[derive(Error, Debug)]
pub enum FinanceError {

    // =============================
    // Ledger / Query Errors
    // =============================

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Ambiguous selector: {count} expenses match {selector}")]
    AmbiguousSelector { selector: String, count: usize },

    // =============================
    // Runtime / Startup Errors
    // =============================

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl FinanceError {
    /// True for faults that come from the ledger file rather than from the caller's input.
    pub fn is_storage(&self) -> bool {
        matches!(self, FinanceError::Storage(_) | FinanceError::Csv(_) | FinanceError::Io(_))
    }

    /// True for faults raised while talking to an external HTTP API.
    pub fn is_upstream(&self) -> bool {
        matches!(self, FinanceError::Upstream(_) | FinanceError::Http(_))
    }
}
