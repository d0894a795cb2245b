//! Ledger, query and tool adapter behavior over a real CSV file

use chrono::NaiveDate;
use finance_tracker_agent::clock::FixedClock;
use finance_tracker_agent::ledger::{Ledger, Selector};
use finance_tracker_agent::models::{Expense, ExpenseChanges, ToolErrorKind};
use finance_tracker_agent::report::{filter_by_period, group_and_sum, GroupKey, Period};
use finance_tracker_agent::tools::create_default_registry;
use finance_tracker_agent::FinanceError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

fn expense(year: i32, month: u32, main: &str, sub: &str, amount: Decimal) -> Expense {
    Expense {
        year,
        month,
        main_category: main.to_string(),
        sub_category: sub.to_string(),
        account: "Main Account".to_string(),
        amount,
        notes: None,
    }
}

fn dinner() -> Expense {
    Expense {
        notes: Some("dinner".to_string()),
        ..expense(2024, 8, "Restaurant Night", "Restaurant - Enjoyment", dec!(56))
    }
}

fn fresh_ledger(dir: &TempDir) -> Ledger {
    let ledger = Ledger::new(dir.path().join("expenses.csv"));
    assert_ok!(ledger.ensure_exists());
    ledger
}

#[test]
fn append_grows_ledger_by_one_matching_row() {
    let dir = TempDir::new().unwrap();
    let ledger = fresh_ledger(&dir);
    assert_ok!(ledger.append(expense(2024, 7, "Groceries", "Groceries", dec!(12.40))));

    let before = ledger.read_all().unwrap().len();
    assert_ok!(ledger.append(dinner()));
    let rows = ledger.read_all().unwrap();

    assert_eq!(rows.len(), before + 1);
    assert_eq!(rows.last(), Some(&dinner()));
}

#[test]
fn non_positive_amount_is_rejected_without_writing() {
    let dir = TempDir::new().unwrap();
    let ledger = fresh_ledger(&dir);
    assert_ok!(ledger.append(dinner()));

    for amount in [dec!(0), dec!(-3.5)] {
        let err = assert_err!(ledger.append(expense(2024, 8, "Groceries", "Groceries", amount)));
        assert!(matches!(err, FinanceError::Validation(_)));
    }
    assert_eq!(ledger.read_all().unwrap().len(), 1);
}

#[test]
fn update_last_follows_the_latest_append() {
    let dir = TempDir::new().unwrap();
    let ledger = fresh_ledger(&dir);
    let changes = ExpenseChanges {
        sub_category: Some("Other".to_string()),
        ..Default::default()
    };

    let appended = [
        expense(2024, 6, "Groceries", "Groceries", dec!(30)),
        expense(2024, 7, "Variable", "Taxi", dec!(14)),
        dinner(),
    ];
    for (i, row) in appended.iter().enumerate() {
        assert_ok!(ledger.append(row.clone()));
        let updated = assert_ok!(ledger.update(&Selector::Last, &changes));
        assert_eq!(updated.main_category, row.main_category);
        assert_eq!(updated.amount, row.amount);

        let rows = ledger.read_all().unwrap();
        assert_eq!(rows.len(), i + 1);
        assert_eq!(rows[i].sub_category, "Other");
    }
}

#[test]
fn grouping_nothing_totals_zero() {
    let grouping = assert_ok!(group_and_sum(&[], &[GroupKey::MainCategory]));
    assert!(grouping.groups.is_empty());
    assert_eq!(grouping.total, Decimal::ZERO);
    assert_eq!(grouping.count, 0);
}

#[test]
fn last_three_months_window_is_inclusive() {
    let today = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
    let records = vec![
        expense(2023, 11, "Groceries", "Groceries", dec!(1)),
        expense(2023, 12, "Groceries", "Groceries", dec!(2)),
        expense(2024, 1, "Groceries", "Groceries", dec!(3)),
        expense(2024, 2, "Groceries", "Groceries", dec!(4)),
        expense(2024, 3, "Groceries", "Groceries", dec!(5)),
        expense(2023, 2, "Groceries", "Groceries", dec!(6)),
    ];

    let window = filter_by_period(&records, &Period::last_months(today, 3));
    let amounts: Vec<Decimal> = window.iter().map(|e| e.amount).collect();
    assert_eq!(amounts, vec![dec!(2), dec!(3), dec!(4)]);
}

#[test]
fn dinner_then_drinks_correction() {
    let dir = TempDir::new().unwrap();
    let ledger = fresh_ledger(&dir);
    assert_ok!(ledger.append(dinner()));

    let august = filter_by_period(&ledger.read_all().unwrap(), &Period::month(2024, 8));
    let totals = assert_ok!(group_and_sum(&august, &[GroupKey::MainCategory])).totals();
    assert_eq!(totals.len(), 1);
    assert_eq!(totals.get("Restaurant Night"), Some(&dec!(56)));

    let changes = ExpenseChanges {
        sub_category: Some("Drinks".to_string()),
        ..Default::default()
    };
    assert_ok!(ledger.update(&Selector::Last, &changes));

    let rows = ledger.read_all().unwrap();
    assert_eq!(rows[0].sub_category, "Drinks");
    assert_eq!(rows[0].amount, dec!(56));
}

#[tokio::test]
async fn malformed_tool_parameters_come_back_structured() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(fresh_ledger(&dir));
    let clock = Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 8, 20).unwrap()));
    let registry = create_default_registry(ledger.clone(), clock);

    let cases = [
        ("save_expense", json!({ "main_category": "Groceries" })),
        ("save_expense", json!({ "amount": "lots" })),
        ("save_expense", json!([56])),
        ("get_monthly_expenses", json!({ "month": 13 })),
        ("update_last_expense", json!({})),
    ];
    for (name, parameters) in cases {
        let output = registry.invoke(name, parameters).await;
        assert!(!output.success, "{} should fail", name);
        assert_eq!(output.error.unwrap().kind, ToolErrorKind::Validation);
    }

    let output = registry.invoke("delete_everything", json!({})).await;
    assert_eq!(output.error.unwrap().kind, ToolErrorKind::UnknownTool);

    assert!(ledger.read_all().unwrap().is_empty());
}

#[tokio::test]
async fn corrupt_ledger_surfaces_as_storage_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("expenses.csv");
    std::fs::write(&path, "when,what\n2024-08-01,coffee\n").unwrap();

    let clock = Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 8, 20).unwrap()));
    let registry = create_default_registry(Arc::new(Ledger::new(path)), clock);

    let output = registry.invoke("get_all_expenses", json!({})).await;
    assert!(!output.success);
    assert_eq!(output.error.unwrap().kind, ToolErrorKind::Storage);
}
