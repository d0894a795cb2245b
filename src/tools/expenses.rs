//! Ledger mutation and listing tools

use super::{parse_params, schema_of, Tool};
use crate::clock::Clock;
use crate::error::FinanceError;
use crate::ledger::{Ledger, Selector};
use crate::models::{Expense, ExpenseChanges, ExpenseFilter, ToolInput, ToolOutput};
use crate::taxonomy::{DEFAULT_ACCOUNT, DEFAULT_MAIN_CATEGORY, DEFAULT_SUB_CATEGORY};
use crate::Result;
use chrono::Datelike;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

fn to_amount(value: f64) -> Result<Decimal> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(2).normalize())
        .ok_or_else(|| FinanceError::Validation(format!("amount {} is not a valid number", value)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parameters for recording a new expense.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SaveExpenseParams {
    /// Year of the expense. Defaults to the current year.
    pub year: Option<i32>,
    /// Month of the expense, 1-12. Defaults to the current month.
    pub month: Option<u32>,
    /// Main category, exactly as returned by get_allowed_categories. Defaults to "Other".
    pub main_category: Option<String>,
    /// Sub category allowed under the main category. Defaults to "Other".
    pub sub_category: Option<String>,
    /// Account the money came from. Defaults to "Main Account".
    pub account: Option<String>,
    /// Amount spent in euros. Must be positive.
    pub amount: f64,
    /// Free-text note, usually the user's own words.
    #[serde(alias = "note")]
    pub notes: Option<String>,
}

/// Any subset of expense fields.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ExpenseFieldsParams {
    pub year: Option<i32>,
    /// Month number, 1-12.
    pub month: Option<u32>,
    pub main_category: Option<String>,
    pub sub_category: Option<String>,
    pub account: Option<String>,
    /// Amount in euros.
    pub amount: Option<f64>,
    #[serde(alias = "note")]
    pub notes: Option<String>,
}

impl ExpenseFieldsParams {
    fn into_changes(self) -> Result<ExpenseChanges> {
        Ok(ExpenseChanges {
            year: self.year,
            month: self.month,
            main_category: self.main_category,
            sub_category: self.sub_category,
            account: self.account,
            amount: self.amount.map(to_amount).transpose()?,
            notes: self.notes,
        })
    }

    fn into_filter(self) -> Result<ExpenseFilter> {
        Ok(ExpenseFilter {
            year: self.year,
            month: self.month,
            main_category: self.main_category,
            sub_category: self.sub_category,
            account: self.account,
            amount: self.amount.map(to_amount).transpose()?,
            notes: self.notes,
        })
    }
}

/// Parameters for updating one expense found by field match.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateExpenseParams {
    /// Fields identifying exactly one existing expense.
    #[serde(rename = "match")]
    pub selector: ExpenseFieldsParams,
    /// Fields to overwrite on that expense.
    pub changes: ExpenseFieldsParams,
}

/// Parameters for listing one month's expenses.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct MonthlyExpensesParams {
    /// Month number, 1-12.
    pub month: u32,
    /// Restrict to this year. When omitted, that month of every year is returned.
    pub year: Option<i32>,
}

/// No parameters.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct NoParams {}

fn expense_list(expenses: &[Expense], empty_message: String) -> Result<ToolOutput> {
    if expenses.is_empty() {
        return Ok(ToolOutput::ok(json!({
            "count": 0,
            "expenses": [],
            "message": empty_message,
        })));
    }

    Ok(ToolOutput::ok(json!({
        "count": expenses.len(),
        "expenses": serde_json::to_value(expenses)?,
    })))
}

//
// ================= save_expense =================
//

pub struct SaveExpenseTool {
    ledger: Arc<Ledger>,
    clock: Arc<dyn Clock>,
}

impl SaveExpenseTool {
    pub fn new(ledger: Arc<Ledger>, clock: Arc<dyn Clock>) -> Self {
        Self { ledger, clock }
    }

    fn build_expense(&self, params: SaveExpenseParams) -> Result<Expense> {
        let today = self.clock.today();
        Ok(Expense {
            year: params.year.unwrap_or_else(|| today.year()),
            month: params.month.unwrap_or_else(|| today.month()),
            main_category: non_empty(params.main_category)
                .unwrap_or_else(|| DEFAULT_MAIN_CATEGORY.to_string()),
            sub_category: non_empty(params.sub_category)
                .unwrap_or_else(|| DEFAULT_SUB_CATEGORY.to_string()),
            account: non_empty(params.account).unwrap_or_else(|| DEFAULT_ACCOUNT.to_string()),
            amount: to_amount(params.amount)?,
            notes: non_empty(params.notes),
        })
    }
}

#[async_trait::async_trait]
impl Tool for SaveExpenseTool {
    fn name(&self) -> &'static str {
        "save_expense"
    }

    fn description(&self) -> &'static str {
        "Record a NEW expense in the ledger. Use exact category and account names from \
         get_allowed_categories. Tobacco goes under Other/Other; restaurant bills other than \
         office lunch go under Restaurant Night/Restaurant - Enjoyment."
    }

    fn parameters(&self) -> Value {
        schema_of::<SaveExpenseParams>()
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let params: SaveExpenseParams = parse_params(input)?;
        let expense = self.build_expense(params)?;
        let saved = self.ledger.append(expense)?;

        Ok(ToolOutput::ok(json!({
            "message": format!(
                "✅ Expense successfully saved with the following attributes:\n{}",
                saved.describe()
            ),
            "expense": serde_json::to_value(&saved)?,
        })))
    }
}

//
// ================= update_last_expense =================
//

pub struct UpdateLastExpenseTool {
    ledger: Arc<Ledger>,
}

impl UpdateLastExpenseTool {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }
}

#[async_trait::async_trait]
impl Tool for UpdateLastExpenseTool {
    fn name(&self) -> &'static str {
        "update_last_expense"
    }

    fn description(&self) -> &'static str {
        "Correct the most recently saved expense. Pass only the fields that change, e.g. new \
         categories, amount or note. Use when the user says fix/change/correct the last expense."
    }

    fn parameters(&self) -> Value {
        schema_of::<ExpenseFieldsParams>()
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let params: ExpenseFieldsParams = parse_params(input)?;
        let changes = params.into_changes()?;
        let updated = self.ledger.update(&Selector::Last, &changes)?;

        Ok(ToolOutput::ok(json!({
            "message": format!(
                "✅ Last expense successfully updated.\n{}",
                updated.describe()
            ),
            "expense": serde_json::to_value(&updated)?,
        })))
    }
}

//
// ================= update_expense =================
//

pub struct UpdateExpenseTool {
    ledger: Arc<Ledger>,
}

impl UpdateExpenseTool {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }
}

#[async_trait::async_trait]
impl Tool for UpdateExpenseTool {
    fn name(&self) -> &'static str {
        "update_expense"
    }

    fn description(&self) -> &'static str {
        "Change one existing expense that is not necessarily the last one. 'match' must \
         identify exactly one expense (e.g. year + month + main_category + amount); 'changes' \
         holds the new values. Fails if nothing or more than one expense matches."
    }

    fn parameters(&self) -> Value {
        schema_of::<UpdateExpenseParams>()
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let params: UpdateExpenseParams = parse_params(input)?;
        let filter = params.selector.into_filter()?;
        if filter.is_empty() {
            return Err(FinanceError::Validation(
                "'match' must name at least one field".to_string(),
            ));
        }
        let changes = params.changes.into_changes()?;
        let updated = self.ledger.update(&Selector::Matching(filter), &changes)?;

        Ok(ToolOutput::ok(json!({
            "message": format!("✅ Expense successfully updated.\n{}", updated.describe()),
            "expense": serde_json::to_value(&updated)?,
        })))
    }
}

//
// ================= listing =================
//

pub struct GetAllExpensesTool {
    ledger: Arc<Ledger>,
}

impl GetAllExpensesTool {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }
}

#[async_trait::async_trait]
impl Tool for GetAllExpensesTool {
    fn name(&self) -> &'static str {
        "get_all_expenses"
    }

    fn description(&self) -> &'static str {
        "List every expense in the ledger."
    }

    fn parameters(&self) -> Value {
        schema_of::<NoParams>()
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let _: NoParams = parse_params(input)?;
        let expenses = self.ledger.read_all()?;
        expense_list(&expenses, "No expenses found.".to_string())
    }
}

pub struct GetMonthlyExpensesTool {
    ledger: Arc<Ledger>,
}

impl GetMonthlyExpensesTool {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }
}

#[async_trait::async_trait]
impl Tool for GetMonthlyExpensesTool {
    fn name(&self) -> &'static str {
        "get_monthly_expenses"
    }

    fn description(&self) -> &'static str {
        "List the individual expenses of one month."
    }

    fn parameters(&self) -> Value {
        schema_of::<MonthlyExpensesParams>()
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let params: MonthlyExpensesParams = parse_params(input)?;
        if !(1..=12).contains(&params.month) {
            return Err(FinanceError::Validation(format!(
                "month must be between 1 and 12, got {}",
                params.month
            )));
        }

        let expenses: Vec<Expense> = self
            .ledger
            .read_all()?
            .into_iter()
            .filter(|e| e.month == params.month && params.year.map_or(true, |y| y == e.year))
            .collect();

        expense_list(
            &expenses,
            format!("No expenses found for month {}.", params.month),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::ToolErrorKind;
    use crate::tools::create_default_registry;
    use crate::tools::ToolRegistry;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<Ledger>, ToolRegistry) {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(Ledger::new(dir.path().join("expenses.csv")));
        ledger.ensure_exists().unwrap();
        let clock = Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 8, 20).unwrap()));
        let registry = create_default_registry(ledger.clone(), clock);
        (dir, ledger, registry)
    }

    #[tokio::test]
    async fn test_save_expense_applies_defaults() {
        let (_dir, ledger, registry) = setup();
        let output = registry
            .invoke("save_expense", json!({ "amount": 4.5, "note": "cigarettes" }))
            .await;
        assert!(output.success, "{:?}", output.error);

        let rows = ledger.read_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].year, 2024);
        assert_eq!(rows[0].month, 8);
        assert_eq!(rows[0].main_category, "Other");
        assert_eq!(rows[0].sub_category, "Other");
        assert_eq!(rows[0].account, "Main Account");
        assert_eq!(rows[0].amount, dec!(4.5));
        assert_eq!(rows[0].notes.as_deref(), Some("cigarettes"));
    }

    #[tokio::test]
    async fn test_save_expense_missing_amount_is_validation_error() {
        let (_dir, ledger, registry) = setup();
        let output = registry
            .invoke("save_expense", json!({ "main_category": "Groceries" }))
            .await;
        assert!(!output.success);
        let error = output.error.unwrap();
        assert_eq!(error.kind, ToolErrorKind::Validation);
        assert!(error.message.contains("amount"));
        assert!(ledger.read_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_expense_negative_amount_rejected() {
        let (_dir, ledger, registry) = setup();
        let output = registry
            .invoke("save_expense", json!({ "amount": -10 }))
            .await;
        assert_eq!(output.error.unwrap().kind, ToolErrorKind::Validation);
        assert!(ledger.read_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_expense_huge_amount_rejected() {
        let (_dir, ledger, registry) = setup();
        for amount in [json!(5e28), json!(1e12 + 1.0)] {
            let output = registry
                .invoke("save_expense", json!({ "amount": amount }))
                .await;
            assert_eq!(output.error.unwrap().kind, ToolErrorKind::Validation);
        }
        assert!(ledger.read_all().unwrap().is_empty());

        let output = registry
            .invoke("update_last_expense", json!({ "amount": 5e28 }))
            .await;
        assert!(!output.success);
    }

    #[tokio::test]
    async fn test_save_expense_message_lists_attributes() {
        let (_dir, _ledger, registry) = setup();
        let output = registry
            .invoke(
                "save_expense",
                json!({
                    "year": 2024,
                    "month": 8,
                    "main_category": "Restaurant Night",
                    "sub_category": "Restaurant - Enjoyment",
                    "account": "Main Account",
                    "amount": 56,
                    "notes": "dinner"
                }),
            )
            .await;
        let message = output.data["message"].as_str().unwrap();
        assert!(message.contains("Restaurant - Enjoyment"));
        assert!(message.contains("€56.00"));
        assert_eq!(output.data["expense"]["amount"], "56");
    }

    #[tokio::test]
    async fn test_update_last_expense_changes_sub_category() {
        let (_dir, ledger, registry) = setup();
        for amount in [10, 56] {
            registry
                .invoke(
                    "save_expense",
                    json!({
                        "main_category": "Restaurant Night",
                        "sub_category": "Restaurant - Enjoyment",
                        "amount": amount
                    }),
                )
                .await;
        }

        let output = registry
            .invoke("update_last_expense", json!({ "sub_category": "Drinks" }))
            .await;
        assert!(output.success, "{:?}", output.error);

        let rows = ledger.read_all().unwrap();
        assert_eq!(rows[0].sub_category, "Restaurant - Enjoyment");
        assert_eq!(rows[1].sub_category, "Drinks");
        assert_eq!(rows[1].amount, dec!(56));
    }

    #[tokio::test]
    async fn test_update_last_expense_on_empty_ledger() {
        let (_dir, _ledger, registry) = setup();
        let output = registry
            .invoke("update_last_expense", json!({ "amount": 3 }))
            .await;
        assert_eq!(output.error.unwrap().kind, ToolErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_update_expense_ambiguous_match() {
        let (_dir, _ledger, registry) = setup();
        for amount in [10, 20] {
            registry
                .invoke(
                    "save_expense",
                    json!({ "main_category": "Groceries", "sub_category": "Groceries", "amount": amount }),
                )
                .await;
        }

        let output = registry
            .invoke(
                "update_expense",
                json!({ "match": { "main_category": "Groceries" }, "changes": { "notes": "x" } }),
            )
            .await;
        assert_eq!(output.error.unwrap().kind, ToolErrorKind::AmbiguousSelector);

        let output = registry
            .invoke(
                "update_expense",
                json!({ "match": { "main_category": "Groceries", "amount": 20 }, "changes": { "notes": "x" } }),
            )
            .await;
        assert!(output.success);
        assert_eq!(output.data["expense"]["notes"], "x");
    }

    #[tokio::test]
    async fn test_update_expense_requires_match_fields() {
        let (_dir, _ledger, registry) = setup();
        let output = registry
            .invoke("update_expense", json!({ "match": {}, "changes": { "notes": "x" } }))
            .await;
        assert_eq!(output.error.unwrap().kind, ToolErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_get_monthly_expenses_filters_by_month() {
        let (_dir, _ledger, registry) = setup();
        registry
            .invoke("save_expense", json!({ "month": 7, "amount": 1 }))
            .await;
        registry
            .invoke("save_expense", json!({ "month": 8, "amount": 2 }))
            .await;

        let output = registry
            .invoke("get_monthly_expenses", json!({ "month": 8 }))
            .await;
        assert_eq!(output.data["count"], 1);

        let output = registry
            .invoke("get_monthly_expenses", json!({ "month": 3 }))
            .await;
        assert_eq!(output.data["count"], 0);
        assert_eq!(output.data["message"], "No expenses found for month 3.");
    }

    #[tokio::test]
    async fn test_storage_fault_is_reported_not_raised() {
        let (dir, _ledger, registry) = setup();
        std::fs::write(dir.path().join("expenses.csv"), "garbage\n1,2\n").unwrap();

        let output = registry.invoke("get_all_expenses", json!({})).await;
        assert_eq!(output.error.unwrap().kind, ToolErrorKind::Storage);
    }
}
