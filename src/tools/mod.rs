//! Tool trait and registry
//!
//! Tools are the only operations the agent runtime can invoke. Each one
//! declares a JSON schema derived from its typed parameter struct, and every
//! fault is returned to the runtime as a structured `ToolOutput` error.

use crate::clock::Clock;
use crate::error::FinanceError;
use crate::ledger::Ledger;
use crate::models::{ToolErrorKind, ToolInput, ToolOutput, ToolSpec};
use crate::Result;
use schemars::generate::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod expenses;
pub mod reference;
pub mod reports;

pub use expenses::{
    GetAllExpensesTool, GetMonthlyExpensesTool, SaveExpenseTool, UpdateExpenseTool,
    UpdateLastExpenseTool,
};
pub use reference::{AllowedCategoriesTool, CurrentDateTool};
pub use reports::{SpendingReportTool, SpendingSummaryTool};

/// Trait for a single tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of the parameter object
    fn parameters(&self) -> Value;
    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec()).collect()
    }

    /// Run a tool by name. Never fails: lookup and execution faults become error payloads.
    pub async fn invoke(&self, name: &str, parameters: Value) -> ToolOutput {
        let Some(tool) = self.get(name) else {
            warn!(tool_name = %name, "Tool not registered");
            return ToolOutput::failure(
                ToolErrorKind::UnknownTool,
                format!("no tool named '{}'", name),
            );
        };

        let input = ToolInput {
            tool_name: name.to_string(),
            parameters,
        };

        match tool.execute(&input).await {
            Ok(output) => {
                debug!(tool_name = %name, "Tool succeeded");
                output
            }
            Err(e) => {
                warn!(tool_name = %name, error = %e, "Tool execution failed");
                ToolOutput::from_error(&e)
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_object_parameters(input: &ToolInput) -> Result<()> {
    if input.parameters.is_object() {
        Ok(())
    } else {
        Err(FinanceError::Validation(format!(
            "parameters for {} must be a JSON object",
            input.tool_name
        )))
    }
}

/// Deserialize the parameter object into the tool's typed parameters
pub(crate) fn parse_params<P: DeserializeOwned>(input: &ToolInput) -> Result<P> {
    ensure_object_parameters(input)?;
    serde_json::from_value(input.parameters.clone()).map_err(|e| {
        FinanceError::Validation(format!("invalid parameters for {}: {}", input.tool_name, e))
    })
}

/// Inline JSON schema for a parameter struct, without the meta keys the runtime does not need
pub(crate) fn schema_of<P: JsonSchema>() -> Value {
    let schema = SchemaSettings::draft07()
        .with(|s| s.inline_subschemas = true)
        .into_generator()
        .into_root_schema_for::<P>();

    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| json!({ "type": "object" }));
    if let Some(object) = value.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }
    value
}

/// Create the registry of every ledger, report and reference tool
pub fn create_default_registry(ledger: Arc<Ledger>, clock: Arc<dyn Clock>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(SaveExpenseTool::new(ledger.clone(), clock.clone())));
    registry.register(Arc::new(UpdateLastExpenseTool::new(ledger.clone())));
    registry.register(Arc::new(UpdateExpenseTool::new(ledger.clone())));
    registry.register(Arc::new(GetAllExpensesTool::new(ledger.clone())));
    registry.register(Arc::new(GetMonthlyExpensesTool::new(ledger.clone())));

    for tool in SpendingReportTool::all(ledger.clone()) {
        registry.register(Arc::new(tool));
    }
    registry.register(Arc::new(SpendingSummaryTool::new(ledger, clock.clone())));

    registry.register(Arc::new(AllowedCategoriesTool));
    registry.register(Arc::new(CurrentDateTool::new(clock)));

    registry
}
