//! Reference data the runtime needs to fill in expense fields

use super::{parse_params, schema_of, Tool};
use crate::clock::Clock;
use crate::models::{ToolInput, ToolOutput};
use crate::taxonomy;
use crate::tools::expenses::NoParams;
use crate::Result;
use chrono::Datelike;
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub struct AllowedCategoriesTool;

#[async_trait::async_trait]
impl Tool for AllowedCategoriesTool {
    fn name(&self) -> &'static str {
        "get_allowed_categories"
    }

    fn description(&self) -> &'static str {
        "The allowed main categories, the sub categories under each, and the allowed accounts. \
         Call this before saving or updating an expense."
    }

    fn parameters(&self) -> Value {
        schema_of::<NoParams>()
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let _: NoParams = parse_params(input)?;

        let mut categories = Map::new();
        for main in taxonomy::main_categories() {
            let subs = taxonomy::sub_categories(main).unwrap_or_default();
            categories.insert(main.to_string(), json!(subs));
        }

        Ok(ToolOutput::ok(json!({
            "main_categories": categories,
            "accounts": taxonomy::ACCOUNTS,
        })))
    }
}

pub struct CurrentDateTool {
    clock: Arc<dyn Clock>,
}

impl CurrentDateTool {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait::async_trait]
impl Tool for CurrentDateTool {
    fn name(&self) -> &'static str {
        "get_current_date"
    }

    fn description(&self) -> &'static str {
        "Today's date, month name and year. Use it to resolve 'this month', 'last month' and \
         similar phrases."
    }

    fn parameters(&self) -> Value {
        schema_of::<NoParams>()
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let _: NoParams = parse_params(input)?;
        let today = self.clock.today();

        Ok(ToolOutput::ok(json!({
            "date": today.format("%Y-%m-%d").to_string(),
            "month": today.format("%Y-%m").to_string(),
            "month_name": today.format("%B").to_string(),
            "month_number": today.month(),
            "year": today.year(),
        })))
    }
}
