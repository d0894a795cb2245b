//! Command line flags for the `finance-agent` binary.

use crate::config::Interface;
use crate::runtime::openai::DEFAULT_MODEL;
use clap::Parser;
use std::path::{Path, PathBuf};

/// Personal finance tracker agent.
///
/// Records expenses written in plain language into a local CSV ledger and
/// answers questions about your spending. Talk to it in the terminal or run it
/// as a Telegram bot webhook.
///
/// Needs OPENAI_API_KEY in the environment or a .env file. The Telegram
/// interface also needs TG_TOKEN.
#[derive(Debug, Parser, Clone)]
#[command(name = "finance-agent", version)]
pub struct Args {
    /// Which interface to serve.
    #[arg(long, value_enum, default_value_t = Interface::Terminal)]
    interface: Interface,

    /// Enable verbose output to see the agent's tool calls and error details.
    #[arg(short, long)]
    verbose: bool,

    /// The CSV ledger file. Created with a header row if missing.
    #[arg(long, env = "FINANCE_LEDGER", default_value = "data/expenses.csv")]
    ledger: PathBuf,

    /// Chat model name passed to the LLM API.
    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Port for the Telegram webhook server.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Public base URL, registered as the Telegram webhook at startup. Without
    /// it the bot receives nothing unless a webhook was registered earlier.
    #[arg(long, env = "TG_WEBHOOK_URL")]
    webhook_url: Option<String>,
}

impl Args {
    pub fn interface(&self) -> Interface {
        self.interface
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn ledger(&self) -> &Path {
        &self.ledger
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn webhook_url(&self) -> Option<&str> {
        self.webhook_url.as_deref()
    }
}
