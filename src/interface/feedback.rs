//! User-facing message formatting shared by the terminal and Telegram

use crate::models::AgentResponse;

pub const SUCCESS_EMOJI: &str = "✅";
pub const ERROR_EMOJI: &str = "❌";
pub const WARNING_EMOJI: &str = "⚠️";
pub const INFO_EMOJI: &str = "💡";
pub const TECHNICAL_EMOJI: &str = "🔧";

/// Longest error text shown to a user
pub const MAX_DETAIL_CHARS: usize = 200;

pub struct MessageFormatter;

impl MessageFormatter {
    pub fn success(message: &str) -> String {
        format!("{} {}", SUCCESS_EMOJI, message)
    }

    pub fn error(message: &str, technical_details: Option<&str>) -> String {
        match technical_details {
            Some(details) if !details.is_empty() => format!(
                "{} {}\n\n{} Technical details: {}",
                ERROR_EMOJI, message, TECHNICAL_EMOJI, details
            ),
            _ => format!("{} {}", ERROR_EMOJI, message),
        }
    }

    pub fn warning(message: &str) -> String {
        format!("{} {}", WARNING_EMOJI, message)
    }

    pub fn info(message: &str) -> String {
        format!("{} {}", INFO_EMOJI, message)
    }

    pub fn configuration_error(message: &str, suggestion: &str) -> String {
        format!("{}\n{}", Self::error(message, None), Self::info(suggestion))
    }

    /// The agent's reply with the status marker, plus error details when they should be shown
    pub fn response(response: &AgentResponse, verbose: bool) -> String {
        if response.success {
            return Self::success(&response.output);
        }

        let details = response
            .error
            .as_deref()
            .and_then(|e| technical_details(e, verbose));
        Self::error(&response.output, details.as_deref())
    }
}

/// Error text worth showing to the user: API-related faults always, anything
/// in verbose mode. Truncated to `MAX_DETAIL_CHARS`.
pub fn technical_details(error: &str, verbose: bool) -> Option<String> {
    if error.is_empty() || !(verbose || is_api_error(error)) {
        return None;
    }
    Some(truncate(error, MAX_DETAIL_CHARS))
}

pub fn is_api_error(error: &str) -> bool {
    error.to_uppercase().contains("API")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

pub const TERMINAL_WELCOME: &str = "\
Welcome! I'm your personal finance assistant. I can help you:

📊 Track expenses
  • Add new expenses in plain language
  • Correct the last expense or any earlier one
  • Pick categories and accounts for you

📈 Report
  • Spending by month, category, sub category or account
  • Summaries and insights for this month or the last few months

💡 Examples
  • \"Add new expense in a restaurant 56 euros today\"
  • \"I bought groceries for 45 euros\"
  • \"Show spending by category for this month\"
  • \"The last expense was drinks, not dinner\"

🔧 Commands
  • help or ? shows help
  • quit or exit leaves";

pub const TERMINAL_HELP: &str = "\
Finance Tracker Help

Commands:
  • help, h, ?, commands   show this help
  • quit, exit, q, bye, goodbye   exit the application

Examples:
  • \"Add 25 euros for lunch at the office\"
  • \"Record a 200 euro grocery expense\"
  • \"How much did I spend this month?\"
  • \"Spending by account for July 2024\"
  • \"How am I doing over the last 3 months?\"
  • \"Change the last expense to Restaurant Night / Drinks\"

Tips:
  • Amounts are in euros
  • Say the month if it is not the current one
  • Everything is stored locally in a CSV file";

pub const TERMINAL_GOODBYE: &str = "\
👋 Thank you for using the Personal Finance Tracker!
📊 Your expenses are saved and ready for next time.";

pub const TELEGRAM_WELCOME: &str = "\
🚀 Welcome to your Personal Finance Tracker!

Send me your expenses or questions in plain language:
• \"Add 50 euros for groceries today\"
• \"Show my spending this month\"
• \"How much did I spend on restaurants in July?\"

I can track expenses, correct them, and report on your spending. \
Send /help for more examples.";

pub const TELEGRAM_HELP: &str = "\
📖 Finance Tracker Help

Record an expense:
• \"25 euros lunch at the office\"
• \"56 euros dinner, Restaurant Night\"

Fix a mistake:
• \"The last expense should be Drinks\"

Reports:
• \"Spending by category for August 2024\"
• \"Summary of the last 3 months\"

Amounts are in euros.";
