//! User-facing front ends

pub mod feedback;
pub mod telegram;
pub mod terminal;

pub use feedback::MessageFormatter;
pub use telegram::{run_telegram, TelegramSettings};
pub use terminal::{run_terminal, TerminalInterface};
