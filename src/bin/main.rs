use clap::Parser;
use finance_tracker_agent::{
    agent::FinanceAgent,
    args::Args,
    clock::SystemClock,
    config::{setup_hint, AppConfig, Interface},
    interface::{run_telegram, run_terminal, MessageFormatter, TelegramSettings},
    ledger::Ledger,
    runtime::OpenAiRuntime,
    Result,
};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args = Args::parse();

    // RUST_LOG wins over the flag-derived default
    let default_level = match (args.verbose(), args.interface()) {
        (true, _) => "debug",
        (false, Interface::Terminal) => "warn",
        (false, Interface::Telegram) => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!(interface = %args.interface(), "Finance tracker agent starting");

    let config = match AppConfig::from_env(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "{}",
                MessageFormatter::configuration_error(
                    &e.to_string(),
                    setup_hint(args.interface(), &e)
                )
            );
            return ExitCode::FAILURE;
        }
    };

    let agent = match build_agent(&config) {
        Ok(agent) => agent,
        Err(e) => {
            eprintln!(
                "{}",
                MessageFormatter::configuration_error(
                    &format!("Failed to initialize the finance agent: {}", e),
                    setup_hint(config.interface, &e)
                )
            );
            return ExitCode::FAILURE;
        }
    };

    let outcome = match (config.interface, config.telegram) {
        (Interface::Telegram, Some(telegram)) => {
            run_telegram(
                agent,
                TelegramSettings {
                    token: telegram.token,
                    port: telegram.port,
                    webhook_url: telegram.webhook_url,
                    secret_token: telegram.webhook_secret,
                    verbose: config.verbose,
                },
            )
            .await
        }
        _ => run_terminal(agent, config.verbose).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Interface stopped with an error");
            eprintln!("{}", MessageFormatter::error(&e.to_string(), None));
            ExitCode::FAILURE
        }
    }
}

fn build_agent(config: &AppConfig) -> Result<FinanceAgent> {
    let ledger = Arc::new(Ledger::new(config.ledger_path.clone()));
    ledger.ensure_exists()?;
    info!(path = %ledger.path().display(), "Ledger ready");

    let runtime = OpenAiRuntime::new(
        config.openai_api_key.clone(),
        config.model.clone(),
        Some(config.openai_base_url.clone()),
    )?;
    info!(model = %runtime.model(), "LLM runtime ready");

    Ok(FinanceAgent::for_ledger(
        Arc::new(runtime),
        ledger,
        Arc::new(SystemClock),
    ))
}
