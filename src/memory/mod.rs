//! Session memory
//!
//! Explicit per-conversation state and the window of it sent to the runtime

pub mod context_manager;
pub mod store;

pub use context_manager::{ContextConfig, ContextManager};
pub use store::Session;
