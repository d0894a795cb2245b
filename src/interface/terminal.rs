//! Terminal REPL
//!
//! One session, one request at a time. Failures are rendered and the loop
//! keeps going; only exit words, EOF and Ctrl-C end it.

use crate::agent::FinanceAgent;
use crate::interface::feedback::{
    technical_details, MessageFormatter, TERMINAL_GOODBYE, TERMINAL_HELP, TERMINAL_WELCOME,
};
use crate::memory::Session;
use crate::models::{AgentResponse, ExecutionStatus};
use crate::Result;
use std::io::{IsTerminal, Write};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info};

pub const EXIT_COMMANDS: &[&str] = &["quit", "exit", "q", "bye", "goodbye"];
pub const HELP_COMMANDS: &[&str] = &["help", "h", "?", "commands"];

const GREEN: &str = "32";
const RED: &str = "31";
const BLUE: &str = "34";
const YELLOW: &str = "33";
const BOLD: &str = "1";

/// What a line of input asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Exit,
    Help,
    Request(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let text = line.trim();
        let lowered = text.to_lowercase();
        if text.is_empty() {
            Command::Empty
        } else if EXIT_COMMANDS.contains(&lowered.as_str()) {
            Command::Exit
        } else if HELP_COMMANDS.contains(&lowered.as_str()) {
            Command::Help
        } else {
            Command::Request(text.to_string())
        }
    }
}

pub struct TerminalInterface {
    use_colors: bool,
    verbose: bool,
}

impl TerminalInterface {
    pub fn new(use_colors: bool, verbose: bool) -> Self {
        Self {
            use_colors,
            verbose,
        }
    }

    /// Colors only when stdout is a terminal
    pub fn for_stdout(verbose: bool) -> Self {
        Self::new(std::io::stdout().is_terminal(), verbose)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if self.use_colors {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        } else {
            text.to_string()
        }
    }

    fn welcome<W: Write>(&self, out: &mut W) -> Result<()> {
        let rule = "=".repeat(60);
        writeln!(out, "{}", self.paint(&self.paint(&rule, BLUE), BOLD))?;
        writeln!(
            out,
            "{}",
            self.paint(&self.paint("           Personal Finance Tracker Agent", BLUE), BOLD)
        )?;
        writeln!(out, "{}", self.paint(&self.paint(&rule, BLUE), BOLD))?;
        writeln!(out)?;
        writeln!(out, "{}", TERMINAL_WELCOME)?;
        writeln!(out, "{}", self.paint(&"-".repeat(60), BLUE))?;
        Ok(())
    }

    fn goodbye<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "\n{}", self.paint(TERMINAL_GOODBYE, GREEN))?;
        Ok(())
    }

    fn render<W: Write>(&self, out: &mut W, response: &AgentResponse) -> Result<()> {
        writeln!(out, "\n🤖 {}", self.paint("Finance Agent:", BOLD))?;

        if self.verbose {
            for observation in &response.observations {
                let outcome = match (&observation.status, &observation.tool_output.error) {
                    (ExecutionStatus::Success, _) => "ok".to_string(),
                    (_, Some(error)) => format!("{:?}: {}", error.kind, error.message),
                    (_, None) => "failed".to_string(),
                };
                writeln!(
                    out,
                    "{}",
                    self.paint(
                        &format!(
                            "  🔧 {} ({} ms) {} → {}",
                            observation.tool_name,
                            observation.execution_time_ms,
                            observation.tool_input,
                            outcome
                        ),
                        YELLOW
                    )
                )?;
            }
        }

        if response.success {
            writeln!(out, "{}", MessageFormatter::success(&response.output))?;
        } else {
            writeln!(
                out,
                "{}",
                self.paint(&MessageFormatter::error(&response.output, None), RED)
            )?;
            if let Some(details) = response
                .error
                .as_deref()
                .and_then(|e| technical_details(e, self.verbose))
            {
                writeln!(
                    out,
                    "{} {} {}",
                    self.paint("🔧", RED),
                    self.paint("Technical details:", YELLOW),
                    details
                )?;
            }
        }
        Ok(())
    }

    /// Run the REPL until an exit word, EOF or Ctrl-C
    pub async fn run<R, W>(
        &self,
        agent: &FinanceAgent,
        session: &mut Session,
        mut input: R,
        out: &mut W,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        self.welcome(out)?;

        loop {
            write!(out, "\n{} {} ", self.paint("💬", GREEN), self.paint("You:", BOLD))?;
            out.flush()?;

            let mut line = String::new();
            let read = tokio::select! {
                read = input.read_line(&mut line) => read?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, leaving terminal session");
                    self.goodbye(out)?;
                    return Ok(());
                }
            };

            if read == 0 {
                debug!("End of input");
                self.goodbye(out)?;
                return Ok(());
            }

            match Command::parse(&line) {
                Command::Empty => {
                    writeln!(
                        out,
                        "{}",
                        self.paint(
                            &MessageFormatter::warning(
                                "Please enter a command or type 'help' for assistance."
                            ),
                            YELLOW
                        )
                    )?;
                }
                Command::Exit => {
                    self.goodbye(out)?;
                    return Ok(());
                }
                Command::Help => {
                    writeln!(out, "\n{}", TERMINAL_HELP)?;
                }
                Command::Request(text) => {
                    tokio::select! {
                        response = agent.execute_request(session, &text) => {
                            self.render(out, &response)?;
                        }
                        _ = tokio::signal::ctrl_c() => {
                            writeln!(
                                out,
                                "\n{}",
                                MessageFormatter::warning("Request was interrupted. Please try again.")
                            )?;
                        }
                    }
                }
            }
        }
    }
}

/// Interactive session on stdin/stdout
pub async fn run_terminal(agent: FinanceAgent, verbose: bool) -> Result<()> {
    let interface = TerminalInterface::for_stdout(verbose);
    let mut session = Session::new();
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();

    info!(session_id = %session.session_id, "Starting terminal session");
    interface.run(&agent, &mut session, stdin, &mut stdout).await
}
