//! Ledger store
//!
//! The CSV file is the database. Every read loads the whole file and every
//! mutation rewrites it through a temp file + rename. Writers inside one
//! process are serialized; separate processes sharing a file are not.

use crate::error::FinanceError;
use crate::models::{Expense, ExpenseChanges, ExpenseFilter};
use crate::Result;
use csv::Trim;
use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Column order of the ledger file
pub const HEADER: [&str; 7] = [
    "year",
    "month",
    "main_category",
    "sub_category",
    "account",
    "amount",
    "notes",
];

/// Which single record an update applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// The most recently appended record
    Last,
    /// The only record matching every set field
    Matching(ExpenseFilter),
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Last => write!(f, "the last expense"),
            Selector::Matching(filter) => write!(f, "{}", filter),
        }
    }
}

pub struct Ledger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the parent directory and a header-only file when the ledger is missing
    pub fn ensure_exists(&self) -> Result<()> {
        let _guard = self.lock()?;
        if !self.path.exists() {
            info!(path = %self.path.display(), "Creating empty ledger");
            self.write_all(&[])?;
        }
        Ok(())
    }

    /// Load and parse every row
    pub fn read_all(&self) -> Result<Vec<Expense>> {
        let file = File::open(&self.path).map_err(|e| {
            FinanceError::Storage(format!(
                "cannot open ledger {}: {}",
                self.path.display(),
                e
            ))
        })?;

        if file.metadata()?.len() == 0 {
            return Ok(Vec::new());
        }

        let expenses = parse_expenses(file)?;
        debug!(rows = expenses.len(), "Ledger loaded");
        Ok(expenses)
    }

    /// Validate and append one record
    pub fn append(&self, expense: Expense) -> Result<Expense> {
        expense.validate()?;

        let _guard = self.lock()?;
        let mut expenses = if self.path.exists() {
            self.read_all()?
        } else {
            Vec::new()
        };

        expenses.push(expense.clone());
        self.write_all(&expenses)?;

        info!(
            year = expense.year,
            month = expense.month,
            main_category = %expense.main_category,
            amount = %expense.amount,
            rows = expenses.len(),
            "Expense appended"
        );

        Ok(expense)
    }

    /// Apply `changes` to the single record chosen by `selector`
    pub fn update(&self, selector: &Selector, changes: &ExpenseChanges) -> Result<Expense> {
        if changes.is_empty() {
            return Err(FinanceError::Validation(
                "no fields to update were supplied".to_string(),
            ));
        }

        let _guard = self.lock()?;
        let mut expenses = self.read_all()?;
        let index = resolve(&expenses, selector)?;

        let mut updated = expenses[index].clone();
        changes.apply(&mut updated);
        updated.validate()?;

        expenses[index] = updated.clone();
        self.write_all(&expenses)?;

        info!(selector = %selector, row = index, "Expense updated");

        Ok(updated)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| FinanceError::Storage("ledger lock poisoned".to_string()))
    }

    fn write_all(&self, expenses: &[Expense]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut temp = NamedTempFile::new_in(&dir)?;
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(temp.as_file_mut());
            writer.write_record(HEADER)?;
            for expense in expenses {
                writer.serialize(expense)?;
            }
            writer.flush()?;
        }
        temp.as_file().sync_all()?;

        temp.persist(&self.path).map_err(|e| {
            FinanceError::Storage(format!(
                "cannot replace ledger {}: {}",
                self.path.display(),
                e.error
            ))
        })?;

        Ok(())
    }
}

fn parse_expenses<R: Read>(reader: R) -> Result<Vec<Expense>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(Trim::All).from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| FinanceError::Storage(format!("unreadable ledger header: {}", e)))?
        .clone();

    if headers.is_empty() {
        return Ok(Vec::new());
    }

    if !headers.iter().eq(HEADER.iter().copied()) {
        return Err(FinanceError::Storage(format!(
            "unexpected ledger header '{}', expected '{}'",
            headers.iter().collect::<Vec<_>>().join(","),
            HEADER.join(",")
        )));
    }

    let mut expenses = Vec::new();
    for (index, record) in csv_reader.deserialize::<Expense>().enumerate() {
        let expense = record.map_err(|e| {
            let line = e
                .position()
                .map(|p| p.line())
                .unwrap_or(index as u64 + 2);
            FinanceError::Storage(format!("malformed ledger row at line {}: {}", line, e))
        })?;
        expenses.push(expense);
    }

    Ok(expenses)
}

/// Index of the one record `selector` addresses
pub fn resolve(expenses: &[Expense], selector: &Selector) -> Result<usize> {
    match selector {
        Selector::Last => expenses.len().checked_sub(1).ok_or_else(|| {
            FinanceError::NotFound("the ledger has no expenses to update".to_string())
        }),
        Selector::Matching(filter) => {
            let matches: Vec<usize> = expenses
                .iter()
                .enumerate()
                .filter(|(_, e)| filter.matches(e))
                .map(|(i, _)| i)
                .collect();

            match matches.as_slice() {
                [] => Err(FinanceError::NotFound(format!(
                    "no expense matches {}",
                    filter
                ))),
                [index] => Ok(*index),
                _ => Err(FinanceError::AmbiguousSelector {
                    selector: filter.to_string(),
                    count: matches.len(),
                }),
            }
        }
    }
}
