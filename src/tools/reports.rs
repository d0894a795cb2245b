//! Aggregated spending reports

use super::{parse_params, schema_of, Tool};
use crate::clock::Clock;
use crate::error::FinanceError;
use crate::ledger::Ledger;
use crate::models::{ToolInput, ToolOutput};
use crate::report::{
    filter_by_period, group_and_sum, summarize, GroupKey, Period, MAX_LAST_MONTHS,
};
use crate::tools::expenses::NoParams;
use crate::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// A calendar month.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct MonthParams {
    pub year: i32,
    /// Month number, 1-12.
    pub month: u32,
}

fn check_month(month: u32) -> Result<()> {
    if (1..=12).contains(&month) {
        Ok(())
    } else {
        Err(FinanceError::Validation(format!(
            "month must be between 1 and 12, got {}",
            month
        )))
    }
}

/// Whether a report covers the whole ledger or one month
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Ledger,
    Month,
}

/// Grouped totals over a fixed set of keys
pub struct SpendingReportTool {
    name: &'static str,
    description: &'static str,
    keys: &'static [GroupKey],
    scope: Scope,
    ledger: Arc<Ledger>,
}

impl SpendingReportTool {
    pub fn by_year_and_month(ledger: Arc<Ledger>) -> Self {
        Self {
            name: "get_spendings_by_year_and_month",
            description: "Total, average and count of spending per year and month across the \
                          whole ledger.",
            keys: &[GroupKey::Year, GroupKey::Month],
            scope: Scope::Ledger,
            ledger,
        }
    }

    pub fn by_category_for_month(ledger: Arc<Ledger>) -> Self {
        Self {
            name: "get_spendings_by_category_for_month",
            description: "Total, average and count of spending per main category for one month.",
            keys: &[GroupKey::MainCategory],
            scope: Scope::Month,
            ledger,
        }
    }

    pub fn by_main_and_subcategory_for_month(ledger: Arc<Ledger>) -> Self {
        Self {
            name: "get_spendings_by_main_and_subcategory_for_month",
            description: "Total, average and count of spending per main and sub category for \
                          one month.",
            keys: &[GroupKey::MainCategory, GroupKey::SubCategory],
            scope: Scope::Month,
            ledger,
        }
    }

    pub fn by_account_for_month(ledger: Arc<Ledger>) -> Self {
        Self {
            name: "get_spendings_by_account_for_month",
            description: "Total, average and count of spending per account for one month.",
            keys: &[GroupKey::Account],
            scope: Scope::Month,
            ledger,
        }
    }

    pub fn all(ledger: Arc<Ledger>) -> Vec<Self> {
        vec![
            Self::by_year_and_month(ledger.clone()),
            Self::by_category_for_month(ledger.clone()),
            Self::by_main_and_subcategory_for_month(ledger.clone()),
            Self::by_account_for_month(ledger),
        ]
    }
}

#[async_trait::async_trait]
impl Tool for SpendingReportTool {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn parameters(&self) -> Value {
        match self.scope {
            Scope::Ledger => schema_of::<NoParams>(),
            Scope::Month => schema_of::<MonthParams>(),
        }
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let records = match self.scope {
            Scope::Ledger => {
                let _: NoParams = parse_params(input)?;
                self.ledger.read_all()?
            }
            Scope::Month => {
                let params: MonthParams = parse_params(input)?;
                check_month(params.month)?;
                let period = Period::month(params.year, params.month);
                filter_by_period(&self.ledger.read_all()?, &period)
            }
        };

        let grouping = group_and_sum(&records, self.keys)?;
        let mut data = grouping.to_json();
        if grouping.groups.is_empty() {
            data["message"] = json!("No expenses found for this period.");
        }

        Ok(ToolOutput::ok(data))
    }
}

/// Period selector for the summary tool.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PeriodParam {
    /// The current calendar month.
    #[default]
    CurrentMonth,
    /// The current month and the months before it, `count` months in total (1-120).
    LastMonths { count: u32 },
    /// One specific month.
    Month { year: i32, month: u32 },
    /// A whole calendar year.
    Year { year: i32 },
}

/// Parameters for the spending summary.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct SummaryParams {
    /// Period to summarize. Defaults to the current month.
    #[serde(default)]
    pub period: PeriodParam,
}

pub struct SpendingSummaryTool {
    ledger: Arc<Ledger>,
    clock: Arc<dyn Clock>,
}

impl SpendingSummaryTool {
    pub fn new(ledger: Arc<Ledger>, clock: Arc<dyn Clock>) -> Self {
        Self { ledger, clock }
    }

    fn resolve_period(&self, param: PeriodParam) -> Result<Period> {
        let today = self.clock.today();
        match param {
            PeriodParam::CurrentMonth => Ok(Period::current_month(today)),
            PeriodParam::LastMonths { count } if count == 0 || count > MAX_LAST_MONTHS => {
                Err(FinanceError::Validation(format!(
                    "count must be between 1 and {}, got {}",
                    MAX_LAST_MONTHS, count
                )))
            }
            PeriodParam::LastMonths { count } => Ok(Period::last_months(today, count)),
            PeriodParam::Month { year, month } => {
                check_month(month)?;
                Ok(Period::month(year, month))
            }
            PeriodParam::Year { year } => Ok(Period::year(year)),
        }
    }
}

#[async_trait::async_trait]
impl Tool for SpendingSummaryTool {
    fn name(&self) -> &'static str {
        "get_spending_summary"
    }

    fn description(&self) -> &'static str {
        "Spending summary for a period: total, average, count, per-category, per-account and \
         per-month totals, the largest category with its share and the largest single expense. \
         Use it for insight questions such as 'how am I doing this month' or 'last 3 months'."
    }

    fn parameters(&self) -> Value {
        schema_of::<SummaryParams>()
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let params: SummaryParams = parse_params(input)?;
        let period = self.resolve_period(params.period)?;
        let records = filter_by_period(&self.ledger.read_all()?, &period);
        let summary = summarize(&records)?;

        Ok(ToolOutput::ok(json!({
            "period": period.to_string(),
            "total_spent": summary.total,
            "count": summary.count,
            "average_spent": summary.average,
            "by_main_category": summary.by_main_category.to_json()["groups"],
            "by_account": summary.by_account.to_json()["groups"],
            "by_month": summary.by_month.to_json()["groups"],
            "largest_category": summary.largest_category,
            "largest_expense": summary.largest_expense,
        })))
    }
}
