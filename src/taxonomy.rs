//! Expense taxonomy
//!
//! The fixed main-category → sub-category table and the account set.
//! Membership is exact and case-sensitive.

use crate::error::FinanceError;
use crate::Result;
use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};

pub const DEFAULT_MAIN_CATEGORY: &str = "Other";
pub const DEFAULT_SUB_CATEGORY: &str = "Other";
pub const DEFAULT_ACCOUNT: &str = "Main Account";

pub const ACCOUNTS: &[&str] = &["Main Account", "Savings Account", "Food Account"];

const TAXONOMY: &[(&str, &[&str])] = &[
    (
        "AP House Expenses",
        &[
            "AP Home Utilities",
            "Electricity",
            "Water",
            "Home Improvements",
            "Repairs",
            "Furniture / Appliances",
            "Home Insurence",
            "Mortgage",
            "House Payment",
            "Other",
        ],
    ),
    (
        "Car Expense",
        &["Auto & Gas", "Car Insurance", "ICU Car", "Parking", "Repairs", "Other"],
    ),
    (
        "Corroios House Expenses",
        &[
            "Utilities",
            "Electricity",
            "Water",
            "Rent",
            "Mortgage",
            "House Payment",
            "Apartment",
            "Home Improvements",
            "Repairs",
            "Furniture / Appliances",
            "Home Insurence",
            "Laundry",
            "Other",
        ],
    ),
    ("Drinks", &["Drinks", "Coffee", "Party", "Other"]),
    ("Groceries", &["Groceries", "Groceries Revolut", "Stuff", "Other"]),
    ("Lunch Office", &["Lunch Office", "Coffee", "Restaurants", "Other"]),
    (
        "Other",
        &[
            "Other",
            "Fine SS",
            "Bank Comission",
            "Transfer from main to savings",
            "Transfer savings to main",
            "Emergency Fund",
            "Paycheck",
            "Revolut",
        ],
    ),
    ("Phone", &["Phone", "Subscriptions", "Tech", "Other"]),
    (
        "Restaurant Night",
        &["Restaurant - Enjoyment", "Restaurants", "Drinks", "Uber Eats", "Other"],
    ),
    (
        "Variable",
        &[
            "Aesthetic",
            "Airbnb",
            "Books",
            "Classes",
            "Coffee",
            "Doctor / Dentist",
            "Education",
            "Fitness",
            "Fun / Entertainment",
            "Gear & Clothing",
            "Haircut",
            "Metro",
            "Netflix",
            "Party",
            "Presents Family",
            "Sport",
            "Stuff",
            "Subscriptions",
            "Taxi",
            "Tech",
            "Travel",
            "Uber Eats",
            "Vacations",
            "Vet",
            "Other",
        ],
    ),
];

lazy_static! {
    static ref SUB_CATEGORIES: HashMap<&'static str, HashSet<&'static str>> = TAXONOMY
        .iter()
        .map(|(main, subs)| (*main, subs.iter().copied().collect()))
        .collect();
}

/// Main categories in table order
pub fn main_categories() -> impl Iterator<Item = &'static str> {
    TAXONOMY.iter().map(|(main, _)| *main)
}

/// Allowed sub-categories for a main category
pub fn sub_categories(main_category: &str) -> Option<&'static [&'static str]> {
    TAXONOMY
        .iter()
        .find(|(main, _)| *main == main_category)
        .map(|(_, subs)| *subs)
}

pub fn is_known_pair(main_category: &str, sub_category: &str) -> bool {
    SUB_CATEGORIES
        .get(main_category)
        .is_some_and(|subs| subs.contains(sub_category))
}

pub fn is_known_account(account: &str) -> bool {
    ACCOUNTS.contains(&account)
}

/// Check a category pair and account against the taxonomy
pub fn validate(main_category: &str, sub_category: &str, account: &str) -> Result<()> {
    let Some(subs) = SUB_CATEGORIES.get(main_category) else {
        return Err(FinanceError::Validation(format!(
            "unknown main category '{}'; expected one of: {}",
            main_category,
            main_categories().collect::<Vec<_>>().join(", ")
        )));
    };

    if !subs.contains(sub_category) {
        let allowed = sub_categories(main_category).unwrap_or_default();
        return Err(FinanceError::Validation(format!(
            "sub category '{}' is not allowed under '{}'; expected one of: {}",
            sub_category,
            main_category,
            allowed.join(", ")
        )));
    }

    if !is_known_account(account) {
        return Err(FinanceError::Validation(format!(
            "unknown account '{}'; expected one of: {}",
            account,
            ACCOUNTS.join(", ")
        )));
    }

    Ok(())
}
