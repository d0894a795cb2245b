//! Startup configuration
//!
//! Flags come from `args`, credentials from the environment (after `.env` is
//! loaded). A missing credential is the only fatal error the program has.

use crate::args::Args;
use crate::error::FinanceError;
use crate::runtime::openai::DEFAULT_BASE_URL;
use crate::Result;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const TG_TOKEN: &str = "TG_TOKEN";
pub const TG_WEBHOOK_SECRET: &str = "TG_WEBHOOK_SECRET";

/// Which front end serves the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Interface {
    #[default]
    Terminal,
    Telegram,
}

impl Display for Interface {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Interface::Terminal => f.write_str("terminal"),
            Interface::Telegram => f.write_str("telegram"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub interface: Interface,
    pub verbose: bool,
    pub ledger_path: PathBuf,
    pub model: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub token: String,
    pub port: u16,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
}

impl AppConfig {
    /// Build from parsed flags and the process environment
    pub fn from_env(args: &Args) -> Result<Self> {
        Self::from_lookup(args, |key| std::env::var(key).ok())
    }

    /// Build from parsed flags and an arbitrary variable lookup
    pub fn from_lookup<F>(args: &Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let openai_api_key = var(OPENAI_API_KEY).ok_or_else(|| {
            FinanceError::Configuration(
                "OpenAI API key not found. Please set OPENAI_API_KEY environment variable."
                    .to_string(),
            )
        })?;

        let openai_base_url = var(OPENAI_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let telegram = match args.interface() {
            Interface::Terminal => None,
            Interface::Telegram => {
                let token = var(TG_TOKEN).ok_or_else(|| {
                    FinanceError::Configuration(
                        "TG_TOKEN environment variable is required for Telegram interface"
                            .to_string(),
                    )
                })?;
                Some(TelegramConfig {
                    token,
                    port: args.port(),
                    webhook_url: args.webhook_url().map(str::to_string),
                    webhook_secret: var(TG_WEBHOOK_SECRET),
                })
            }
        };

        Ok(Self {
            interface: args.interface(),
            verbose: args.verbose(),
            ledger_path: args.ledger().to_path_buf(),
            model: args.model().to_string(),
            openai_api_key,
            openai_base_url,
            telegram,
        })
    }
}

/// Hint printed under a startup failure
pub fn setup_hint(interface: Interface, error: &FinanceError) -> &'static str {
    match (interface, error) {
        (Interface::Telegram, FinanceError::Configuration(msg)) if msg.contains(TG_TOKEN) => {
            "Set TG_TOKEN to the token BotFather gave you, in the environment or a .env file."
        }
        (_, FinanceError::Configuration(_)) => {
            "Please ensure your OpenAI API key is set in the environment variables."
        }
        (_, e) if e.is_storage() => "Check that the ledger path is writable.",
        _ => "Run with --verbose for more details.",
    }
}
