//! Query and aggregation over loaded ledger records
//!
//! Everything here is pure: callers load the records and supply "today".
//! Grouping compares keys exactly, so "Restaurant Night" and
//! "restaurant night" form separate groups.

use crate::error::FinanceError;
use crate::models::Expense;
use crate::Result;
use chrono::{Datelike, Month, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

//
// ================= Periods =================
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self::new(date.year(), date.month())
    }

    pub fn of(expense: &Expense) -> Self {
        Self::new(expense.year, expense.month)
    }

    /// The month before this one
    pub fn pred(self) -> Self {
        if self.month <= 1 {
            Self::new(self.year - 1, 12)
        } else {
            Self::new(self.year, self.month - 1)
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// Longest "last N months" window a caller may ask for
pub const MAX_LAST_MONTHS: u32 = 120;

/// A set of calendar months
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Period {
    months: BTreeSet<YearMonth>,
}

impl Period {
    pub fn months(year: i32, months: &[u32]) -> Self {
        Self {
            months: months.iter().map(|m| YearMonth::new(year, *m)).collect(),
        }
    }

    pub fn month(year: i32, month: u32) -> Self {
        Self::months(year, &[month])
    }

    pub fn year(year: i32) -> Self {
        Self {
            months: (1..=12).map(|m| YearMonth::new(year, m)).collect(),
        }
    }

    pub fn current_month(today: NaiveDate) -> Self {
        Self {
            months: BTreeSet::from([YearMonth::from_date(today)]),
        }
    }

    /// The month containing `today` plus the `count - 1` months before it.
    /// Callers taking `count` from outside bound it by `MAX_LAST_MONTHS`.
    pub fn last_months(today: NaiveDate, count: u32) -> Self {
        let mut months = BTreeSet::new();
        let mut cursor = YearMonth::from_date(today);
        for _ in 0..count {
            months.insert(cursor);
            cursor = cursor.pred();
        }
        Self { months }
    }

    pub fn contains(&self, year_month: YearMonth) -> bool {
        self.months.contains(&year_month)
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &YearMonth> {
        self.months.iter()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first = self.months.first();
        let last = self.months.last();
        match (first, last) {
            (None, _) | (_, None) => write!(f, "no months"),
            (Some(a), Some(b)) if a == b => write!(f, "{}", a),
            (Some(a), Some(b)) => write!(f, "{} to {}", a, b),
        }
    }
}

/// Records whose (year, month) lies in `period`, in ledger order
pub fn filter_by_period(records: &[Expense], period: &Period) -> Vec<Expense> {
    records
        .iter()
        .filter(|e| period.contains(YearMonth::of(e)))
        .cloned()
        .collect()
}

//
// ================= Grouping =================
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    Year,
    Month,
    MainCategory,
    SubCategory,
    Account,
}

impl GroupKey {
    pub fn name(&self) -> &'static str {
        match self {
            GroupKey::Year => "year",
            GroupKey::Month => "month",
            GroupKey::MainCategory => "main_category",
            GroupKey::SubCategory => "sub_category",
            GroupKey::Account => "account",
        }
    }

    fn value(&self, expense: &Expense) -> GroupValue {
        match self {
            GroupKey::Year => GroupValue::Number(i64::from(expense.year)),
            GroupKey::Month => GroupValue::Number(i64::from(expense.month)),
            GroupKey::MainCategory => GroupValue::Text(expense.main_category.clone()),
            GroupKey::SubCategory => GroupValue::Text(expense.sub_category.clone()),
            GroupKey::Account => GroupValue::Text(expense.account.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupValue {
    Number(i64),
    Text(String),
}

impl fmt::Display for GroupValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupValue::Number(n) => write!(f, "{}", n),
            GroupValue::Text(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTotal {
    pub key: Vec<GroupValue>,
    pub total: Decimal,
    pub average: Decimal,
    pub count: usize,
}

impl GroupTotal {
    /// Key values joined for display, e.g. "Restaurant Night / Drinks"
    pub fn label(&self) -> String {
        self.key
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grouping {
    pub keys: Vec<GroupKey>,
    pub groups: Vec<GroupTotal>,
    pub total: Decimal,
    pub count: usize,
}

impl Grouping {
    pub fn get(&self, key: &[GroupValue]) -> Option<&GroupTotal> {
        self.groups.iter().find(|g| g.key == key)
    }

    /// label → total
    pub fn totals(&self) -> BTreeMap<String, Decimal> {
        self.groups.iter().map(|g| (g.label(), g.total)).collect()
    }

    /// Row-per-group JSON with the key columns named, as handed to the runtime
    pub fn to_json(&self) -> Value {
        let rows: Vec<Value> = self
            .groups
            .iter()
            .map(|group| {
                let mut row = Map::new();
                for (key, value) in self.keys.iter().zip(&group.key) {
                    row.insert(key.name().to_string(), json!(value));
                    if let (GroupKey::Month, GroupValue::Number(m)) = (key, value) {
                        if let Some(name) = month_name(*m) {
                            row.insert("month_name".to_string(), json!(name));
                        }
                    }
                }
                row.insert("total_spent".to_string(), json!(group.total));
                row.insert("average_spent".to_string(), json!(group.average));
                row.insert("count".to_string(), json!(group.count));
                Value::Object(row)
            })
            .collect();

        json!({
            "total_spent": self.total,
            "count": self.count,
            "groups": rows,
        })
    }
}

fn month_name(month: i64) -> Option<&'static str> {
    let month = u8::try_from(month).ok()?;
    Month::try_from(month).ok().map(|m| m.name())
}

fn average(total: Decimal, count: usize) -> Decimal {
    if count == 0 {
        Decimal::ZERO
    } else {
        (total / Decimal::from(count as u64)).round_dp(2)
    }
}

/// Sum `amount` per distinct key tuple; groups come back sorted by key.
/// Totals beyond `Decimal`'s range are a storage error: only a hand-edited
/// ledger can hold amounts that large.
pub fn group_and_sum(records: &[Expense], keys: &[GroupKey]) -> Result<Grouping> {
    let mut buckets: BTreeMap<Vec<GroupValue>, (Decimal, usize)> = BTreeMap::new();
    let mut total = Decimal::ZERO;

    for expense in records {
        let key: Vec<GroupValue> = keys.iter().map(|k| k.value(expense)).collect();
        let bucket = buckets.entry(key).or_insert((Decimal::ZERO, 0));
        bucket.0 = checked_sum(bucket.0, expense.amount)?;
        bucket.1 += 1;
        total = checked_sum(total, expense.amount)?;
    }

    let groups = buckets
        .into_iter()
        .map(|(key, (total, count))| GroupTotal {
            key,
            total,
            average: average(total, count),
            count,
        })
        .collect();

    Ok(Grouping {
        keys: keys.to_vec(),
        groups,
        total,
        count: records.len(),
    })
}

fn checked_sum(total: Decimal, amount: Decimal) -> Result<Decimal> {
    total.checked_add(amount).ok_or_else(|| {
        FinanceError::Storage(format!(
            "ledger amounts are too large to total (adding {} to {})",
            amount, total
        ))
    })
}

//
// ================= Summary =================
//

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryShare {
    pub main_category: String,
    pub total: Decimal,
    pub share_percent: Decimal,
}

/// Numeric inputs for the runtime's narrative insight
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total: Decimal,
    pub count: usize,
    pub average: Decimal,
    pub by_main_category: Grouping,
    pub by_account: Grouping,
    pub by_month: Grouping,
    pub largest_category: Option<CategoryShare>,
    pub largest_expense: Option<Expense>,
}

pub fn summarize(records: &[Expense]) -> Result<Summary> {
    let by_main_category = group_and_sum(records, &[GroupKey::MainCategory])?;
    let by_account = group_and_sum(records, &[GroupKey::Account])?;
    let by_month = group_and_sum(records, &[GroupKey::Year, GroupKey::Month])?;

    let total = by_main_category.total;

    let largest_category = by_main_category
        .groups
        .iter()
        .fold(None::<&GroupTotal>, |best, g| match best {
            Some(b) if b.total >= g.total => Some(b),
            _ => Some(g),
        })
        .map(|g| CategoryShare {
            main_category: g.label(),
            total: g.total,
            share_percent: g
                .total
                .checked_div(total)
                .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                .map(|percent| percent.round_dp(1))
                .unwrap_or(Decimal::ZERO),
        });

    let largest_expense = records
        .iter()
        .fold(None::<&Expense>, |best, e| match best {
            Some(b) if b.amount >= e.amount => Some(b),
            _ => Some(e),
        })
        .cloned();

    Ok(Summary {
        total,
        count: records.len(),
        average: average(total, records.len()),
        by_main_category,
        by_account,
        by_month,
        largest_category,
        largest_expense,
    })
}
