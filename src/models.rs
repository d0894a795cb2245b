//! Core data models for the finance tracker

use crate::error::FinanceError;
use crate::taxonomy;
use crate::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//
// ================= Expense =================
//

/// Largest amount a single expense may record: one trillion euros
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// One ledger row. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub year: i32,
    pub month: u32,
    pub main_category: String,
    pub sub_category: String,
    pub account: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub notes: Option<String>,
}

impl Expense {
    /// Check the record invariants: positive amount, valid month, known taxonomy.
    pub fn validate(&self) -> Result<()> {
        if self.amount <= Decimal::ZERO {
            return Err(FinanceError::Validation(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }

        if self.amount > MAX_AMOUNT {
            return Err(FinanceError::Validation(format!(
                "amount {} exceeds the limit of {}",
                self.amount, MAX_AMOUNT
            )));
        }

        if !(1..=12).contains(&self.month) {
            return Err(FinanceError::Validation(format!(
                "month must be between 1 and 12, got {}",
                self.month
            )));
        }

        if !(1900..=9999).contains(&self.year) {
            return Err(FinanceError::Validation(format!(
                "year {} is out of range",
                self.year
            )));
        }

        taxonomy::validate(&self.main_category, &self.sub_category, &self.account)
    }

    /// Multi-line confirmation block shown to the user after a save or update
    pub fn describe(&self) -> String {
        format!(
            "📅 Date: {}-{:02}\n\
             🏷️ Main Category: {}\n\
             🔖 Sub Category: {}\n\
             🏦 Account: {}\n\
             💰 Amount: €{:.2}\n\
             📝 Note: {}",
            self.year,
            self.month,
            self.main_category,
            self.sub_category,
            self.account,
            self.amount,
            self.notes.as_deref().unwrap_or("No note provided"),
        )
    }
}

/// Partial field map applied by an update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseChanges {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub main_category: Option<String>,
    pub sub_category: Option<String>,
    pub account: Option<String>,
    pub amount: Option<Decimal>,
    pub notes: Option<String>,
}

impl ExpenseChanges {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply(&self, expense: &mut Expense) {
        if let Some(year) = self.year {
            expense.year = year;
        }
        if let Some(month) = self.month {
            expense.month = month;
        }
        if let Some(main) = &self.main_category {
            expense.main_category = main.clone();
        }
        if let Some(sub) = &self.sub_category {
            expense.sub_category = sub.clone();
        }
        if let Some(account) = &self.account {
            expense.account = account.clone();
        }
        if let Some(amount) = self.amount {
            expense.amount = amount;
        }
        if let Some(notes) = &self.notes {
            expense.notes = Some(notes.clone()).filter(|n| !n.is_empty());
        }
    }
}

/// Exact-match predicate over expense fields. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseFilter {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub main_category: Option<String>,
    pub sub_category: Option<String>,
    pub account: Option<String>,
    pub amount: Option<Decimal>,
    pub notes: Option<String>,
}

impl ExpenseFilter {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn matches(&self, expense: &Expense) -> bool {
        self.year.map_or(true, |y| y == expense.year)
            && self.month.map_or(true, |m| m == expense.month)
            && self
                .main_category
                .as_deref()
                .map_or(true, |c| c == expense.main_category)
            && self
                .sub_category
                .as_deref()
                .map_or(true, |c| c == expense.sub_category)
            && self.account.as_deref().map_or(true, |a| a == expense.account)
            && self.amount.map_or(true, |a| a == expense.amount)
            && self
                .notes
                .as_deref()
                .map_or(true, |n| expense.notes.as_deref() == Some(n))
    }
}

impl fmt::Display for ExpenseFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(year) = self.year {
            parts.push(format!("year={}", year));
        }
        if let Some(month) = self.month {
            parts.push(format!("month={}", month));
        }
        if let Some(main) = &self.main_category {
            parts.push(format!("main_category='{}'", main));
        }
        if let Some(sub) = &self.sub_category {
            parts.push(format!("sub_category='{}'", sub));
        }
        if let Some(account) = &self.account {
            parts.push(format!("account='{}'", account));
        }
        if let Some(amount) = self.amount {
            parts.push(format!("amount={}", amount));
        }
        if let Some(notes) = &self.notes {
            parts.push(format!("notes='{}'", notes));
        }

        if parts.is_empty() {
            write!(f, "any expense")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

//
// ================= Conversation =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single turn fragment in a session's conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub role: MessageRole,
    pub content: Option<String>,
    /// Tool invocations requested by the runtime (assistant messages only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// The call this message answers (tool messages only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Approximate token count for context window management
    pub token_count: usize,
}

impl ChatMessage {
    fn build(
        role: MessageRole,
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
        tool_call_id: Option<String>,
    ) -> Self {
        let arguments_len: usize = tool_calls
            .iter()
            .map(|c| c.name.len() + c.arguments.to_string().len())
            .sum();
        let token_count = (content.as_deref().map_or(0, str::len) + arguments_len + 3) / 4;

        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            role,
            content,
            tool_calls,
            tool_call_id,
            token_count,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::build(MessageRole::System, Some(content.into()), Vec::new(), None)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::build(MessageRole::User, Some(content.into()), Vec::new(), None)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::build(MessageRole::Assistant, Some(content.into()), Vec::new(), None)
    }

    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::build(MessageRole::Assistant, content, tool_calls, None)
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::build(
            MessageRole::Tool,
            Some(content.into()),
            Vec::new(),
            Some(tool_call_id.into()),
        )
    }
}

//
// ================= Tool I/O =================
//

/// A tool invocation requested by the agent runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Schema-described tool offered to the agent runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    Validation,
    Storage,
    NotFound,
    AmbiguousSelector,
    UnknownTool,
    Internal,
}

impl From<&FinanceError> for ToolErrorKind {
    fn from(error: &FinanceError) -> Self {
        match error {
            FinanceError::Validation(_) | FinanceError::Serialization(_) => {
                ToolErrorKind::Validation
            }
            FinanceError::Storage(_) | FinanceError::Csv(_) | FinanceError::Io(_) => {
                ToolErrorKind::Storage
            }
            FinanceError::NotFound(_) => ToolErrorKind::NotFound,
            FinanceError::AmbiguousSelector { .. } => ToolErrorKind::AmbiguousSelector,
            FinanceError::Upstream(_)
            | FinanceError::Configuration(_)
            | FinanceError::Http(_) => ToolErrorKind::Internal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ToolOutput {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn failure(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: serde_json::Value::Null,
            error: Some(ToolError {
                kind,
                message: message.into(),
            }),
        }
    }

    pub fn from_error(error: &FinanceError) -> Self {
        Self::failure(ToolErrorKind::from(error), error.to_string())
    }
}

//
// ================= Execution =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

/// Record of one tool call made while answering a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub observation_id: Uuid,
    pub call_id: String,
    pub tool_name: String,
    pub tool_input: serde_json::Value,
    pub tool_output: ToolOutput,
    pub execution_time_ms: u64,
    pub created_at: DateTime<Utc>,
    pub status: ExecutionStatus,
}

//
// ================= Agent Runtime =================
//

/// What the external runtime wants to do next
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeReply {
    /// Final natural-language answer for the user
    Final(String),
    /// Run these tools, feed back their results, then ask again
    ToolCalls {
        content: Option<String>,
        calls: Vec<ToolCall>,
    },
}

//
// ================= Final Result =================
//

/// Outcome of one user request, as handed to an interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub observations: Vec<Observation>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn dinner() -> Expense {
        Expense {
            year: 2024,
            month: 8,
            main_category: "Restaurant Night".to_string(),
            sub_category: "Restaurant - Enjoyment".to_string(),
            account: "Main Account".to_string(),
            amount: dec!(56),
            notes: Some("dinner".to_string()),
        }
    }

    #[test]
    fn test_validate_rejects_non_positive_amount() {
        let mut expense = dinner();
        expense.amount = dec!(0);
        assert!(matches!(expense.validate(), Err(FinanceError::Validation(_))));

        expense.amount = dec!(-3.5);
        assert!(matches!(expense.validate(), Err(FinanceError::Validation(_))));
    }

    #[test]
    fn test_validate_caps_amount() {
        assert_eq!(MAX_AMOUNT, dec!(1000000000000));

        let mut expense = dinner();
        expense.amount = MAX_AMOUNT;
        assert!(expense.validate().is_ok());

        expense.amount = dec!(50000000000000000000000000000);
        assert!(matches!(expense.validate(), Err(FinanceError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_bad_month() {
        let mut expense = dinner();
        expense.month = 13;
        assert!(expense.validate().is_err());
    }

    #[test]
    fn test_changes_apply_only_set_fields() {
        let mut expense = dinner();
        let changes = ExpenseChanges {
            sub_category: Some("Drinks".to_string()),
            ..Default::default()
        };
        changes.apply(&mut expense);

        assert_eq!(expense.sub_category, "Drinks");
        assert_eq!(expense.amount, dec!(56));
        assert_eq!(expense.notes.as_deref(), Some("dinner"));
    }

    #[test]
    fn test_filter_matches_exactly() {
        let expense = dinner();
        let filter = ExpenseFilter {
            month: Some(8),
            main_category: Some("Restaurant Night".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&expense));

        let filter = ExpenseFilter {
            main_category: Some("restaurant night".to_string()),
            ..Default::default()
        };
        assert!(!filter.matches(&expense));
    }

    #[test]
    fn test_describe_mentions_fields() {
        let text = dinner().describe();
        assert!(text.contains("2024-08"));
        assert!(text.contains("€56.00"));
        assert!(text.contains("dinner"));
    }

    #[test]
    fn test_tool_error_kind_mapping() {
        let err = FinanceError::AmbiguousSelector {
            selector: "month=8".to_string(),
            count: 2,
        };
        assert_eq!(ToolErrorKind::from(&err), ToolErrorKind::AmbiguousSelector);
        assert_eq!(
            ToolErrorKind::from(&FinanceError::Storage("x".into())),
            ToolErrorKind::Storage
        );
    }
}
