//! Finance agent - drives one user request through the runtime
//!
//! USER TEXT → RUNTIME → TOOL CALLS → OBSERVE → RUNTIME → ... → ANSWER

use crate::clock::Clock;
use crate::error::FinanceError;
use crate::execution::ExecutionEngine;
use crate::ledger::Ledger;
use crate::memory::{ContextManager, Session};
use crate::models::{AgentResponse, ChatMessage, Observation, RuntimeReply, ToolOutput};
use crate::prompts::system_prompt;
use crate::runtime::AgentRuntime;
use crate::tools::create_default_registry;
use crate::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runtime rounds allowed per request before giving up
pub const MAX_TOOL_ROUNDS: usize = 8;

/// Shown to the user whenever a request fails, whatever the cause
pub const FAILURE_MESSAGE: &str = "I encountered an error while processing your request. \
                                   Please try again or rephrase your request.";

pub struct FinanceAgent {
    runtime: Arc<dyn AgentRuntime>,
    execution_engine: ExecutionEngine,
    context_manager: ContextManager,
    clock: Arc<dyn Clock>,
}

impl FinanceAgent {
    pub fn new(
        runtime: Arc<dyn AgentRuntime>,
        execution_engine: ExecutionEngine,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            runtime,
            execution_engine,
            context_manager: ContextManager::new(),
            clock,
        }
    }

    /// Agent over the default tool set for `ledger`
    pub fn for_ledger(
        runtime: Arc<dyn AgentRuntime>,
        ledger: Arc<Ledger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registry = create_default_registry(ledger, clock.clone());
        Self::new(runtime, ExecutionEngine::new(registry), clock)
    }

    pub fn with_context_manager(mut self, context_manager: ContextManager) -> Self {
        self.context_manager = context_manager;
        self
    }

    /// Answer one user message. Never fails: any fault yields the fixed
    /// failure message with the error text attached, and the session stays usable.
    pub async fn execute_request(&self, session: &mut Session, text: &str) -> AgentResponse {
        let start = Instant::now();
        let mut observations = Vec::new();

        info!(
            session_id = %session.session_id,
            chars = text.len(),
            "Agent: request received"
        );

        let result = self.run(session, text, &mut observations).await;
        self.context_manager.compact(session);

        match result {
            Ok(output) => {
                info!(
                    session_id = %session.session_id,
                    tool_calls = observations.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Agent: request completed"
                );
                AgentResponse {
                    success: true,
                    output,
                    error: None,
                    observations,
                }
            }
            Err(e) => {
                warn!(
                    session_id = %session.session_id,
                    error = %e,
                    "Agent: request failed"
                );
                AgentResponse {
                    success: false,
                    output: FAILURE_MESSAGE.to_string(),
                    error: Some(e.to_string()),
                    observations,
                }
            }
        }
    }

    async fn run(
        &self,
        session: &mut Session,
        text: &str,
        observations: &mut Vec<Observation>,
    ) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(FinanceError::Validation("empty request".to_string()));
        }

        session.add_message(ChatMessage::user(text));
        let tools = self.execution_engine.specs();
        let prompt = system_prompt(self.clock.today());

        for round in 1..=MAX_TOOL_ROUNDS {
            let mut conversation = Vec::with_capacity(session.message_count() + 1);
            conversation.push(ChatMessage::system(prompt.as_str()));
            conversation.extend(self.context_manager.prepare_context(session));

            debug!(round, messages = conversation.len(), "Asking runtime for next step");

            match self.runtime.next_step(&conversation, &tools).await? {
                RuntimeReply::Final(answer) => {
                    session.add_message(ChatMessage::assistant(answer.as_str()));
                    return Ok(answer);
                }
                RuntimeReply::ToolCalls { content, calls } => {
                    debug!(round, calls = calls.len(), "Runtime requested tool calls");

                    session.add_message(ChatMessage::assistant_tool_calls(content, calls.clone()));
                    let batch = self.execution_engine.execute_calls(&calls).await;
                    for observation in &batch {
                        session.add_message(ChatMessage::tool_result(
                            observation.call_id.as_str(),
                            render_tool_output(&observation.tool_output),
                        ));
                    }
                    observations.extend(batch);
                }
            }
        }

        Err(FinanceError::Upstream(format!(
            "runtime did not produce an answer within {} rounds",
            MAX_TOOL_ROUNDS
        )))
    }
}

/// Tool result as the JSON text handed back to the runtime
fn render_tool_output(output: &ToolOutput) -> String {
    serde_json::to_string(output).unwrap_or_else(|e| {
        serde_json::json!({
            "success": false,
            "error": { "kind": "internal", "message": e.to_string() }
        })
        .to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::memory::ContextConfig;
    use crate::models::{ExecutionStatus, MessageRole, ToolCall};
    use crate::runtime::{ScriptStep, ScriptedRuntime};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn call(id: &str, name: &str, arguments: Value) -> ScriptStep {
        ScriptStep::Reply(RuntimeReply::ToolCalls {
            content: None,
            calls: vec![ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            }],
        })
    }

    fn answer(text: &str) -> ScriptStep {
        ScriptStep::Reply(RuntimeReply::Final(text.to_string()))
    }

    fn setup(steps: Vec<ScriptStep>) -> (TempDir, Arc<Ledger>, Arc<ScriptedRuntime>, FinanceAgent) {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(Ledger::new(dir.path().join("expenses.csv")));
        ledger.ensure_exists().unwrap();
        let clock = Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 8, 20).unwrap()));
        let runtime = Arc::new(ScriptedRuntime::new(steps));
        let agent = FinanceAgent::for_ledger(runtime.clone(), ledger.clone(), clock);
        (dir, ledger, runtime, agent)
    }

    #[tokio::test]
    async fn test_save_report_and_correct() {
        let (_dir, ledger, runtime, agent) = setup(vec![
            call(
                "c1",
                "save_expense",
                json!({
                    "main_category": "Restaurant Night",
                    "sub_category": "Restaurant - Enjoyment",
                    "amount": 56,
                    "notes": "56 euros dinner"
                }),
            ),
            answer("Saved your dinner."),
            call(
                "c2",
                "get_spendings_by_category_for_month",
                json!({ "year": 2024, "month": 8 }),
            ),
            answer("You spent 56 on Restaurant Night."),
            call("c3", "update_last_expense", json!({ "sub_category": "Drinks" })),
            answer("Updated."),
        ]);
        let mut session = Session::new();

        let response = agent.execute_request(&mut session, "56 euros dinner").await;
        assert!(response.success);
        assert_eq!(response.output, "Saved your dinner.");
        assert_eq!(response.observations.len(), 1);
        assert_eq!(response.observations[0].status, ExecutionStatus::Success);

        let response = agent
            .execute_request(&mut session, "what did I spend by category in august 2024?")
            .await;
        let report = &response.observations[0].tool_output.data;
        assert_eq!(report["groups"][0]["main_category"], "Restaurant Night");
        assert_eq!(report["groups"][0]["total_spent"], "56");

        let response = agent
            .execute_request(&mut session, "the last one was drinks actually")
            .await;
        assert!(response.success);

        let rows = ledger.read_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sub_category, "Drinks");
        assert_eq!(rows[0].amount, dec!(56));
        assert_eq!(runtime.remaining(), 0);
    }

    #[tokio::test]
    async fn test_runtime_sees_system_prompt_and_tool_results() {
        let (_dir, _ledger, runtime, agent) = setup(vec![
            call("c1", "get_current_date", json!({})),
            answer("It is August."),
        ]);
        let mut session = Session::new();
        agent.execute_request(&mut session, "what month is it?").await;

        let conversations = runtime.conversations();
        assert_eq!(conversations.len(), 2);
        assert_eq!(conversations[0][0].role, MessageRole::System);
        assert!(conversations[0][0]
            .content
            .as_deref()
            .unwrap()
            .contains("2024-08-20"));

        let second = &conversations[1];
        let tool_message = second.last().unwrap();
        assert_eq!(tool_message.role, MessageRole::Tool);
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("c1"));
        assert!(tool_message.content.as_deref().unwrap().contains("2024-08"));

        assert_eq!(session.message_count(), 4);
    }

    #[tokio::test]
    async fn test_custom_context_manager_bounds_history() {
        let (_dir, _ledger, runtime, agent) =
            setup(vec![answer("first"), answer("second"), answer("third")]);
        let agent = agent.with_context_manager(ContextManager::with_config(ContextConfig {
            preserve_recent_count: 3,
            max_stored_messages: 4,
            ..Default::default()
        }));
        let mut session = Session::new();

        for text in ["one", "two", "three"] {
            let response = agent.execute_request(&mut session, text).await;
            assert!(response.success);
        }

        let conversations = runtime.conversations();
        assert_eq!(conversations.len(), 3);
        let last: Vec<Option<&str>> = conversations[2]
            .iter()
            .skip(1)
            .map(|m| m.content.as_deref())
            .collect();
        assert_eq!(last, vec![Some("two"), Some("second"), Some("three")]);

        assert_eq!(session.message_count(), 4);
        let stored = session.messages().next().unwrap();
        assert_eq!(stored.role, MessageRole::User);
        assert_eq!(stored.content.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_tool_error_is_fed_back_not_fatal() {
        let (_dir, ledger, runtime, agent) = setup(vec![
            call("c1", "save_expense", json!({ "amount": 20, "main_category": "Food" })),
            call("c2", "save_expense", json!({ "amount": 20, "main_category": "Groceries", "sub_category": "Groceries" })),
            answer("Saved."),
        ]);
        let mut session = Session::new();
        let response = agent.execute_request(&mut session, "20 on food").await;

        assert!(response.success);
        assert_eq!(response.observations.len(), 2);
        assert_eq!(response.observations[0].status, ExecutionStatus::Failed);

        let seen = runtime.conversations();
        let feedback = seen[1].last().unwrap().content.clone().unwrap();
        assert!(feedback.contains("\"kind\":\"validation\""));
        assert_eq!(ledger.read_all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_oversized_amounts_never_reach_reports() {
        let (_dir, ledger, runtime, agent) = setup(vec![
            call("c1", "save_expense", json!({ "amount": 5e28 })),
            call("c2", "save_expense", json!({ "amount": 5e28 })),
            call("c3", "get_spending_summary", json!({})),
            answer("Those amounts are too large to record."),
        ]);
        let mut session = Session::new();
        let response = agent.execute_request(&mut session, "save 5e28 twice").await;

        assert!(response.success, "{:?}", response.error);
        let statuses: Vec<ExecutionStatus> =
            response.observations.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![
                ExecutionStatus::Failed,
                ExecutionStatus::Failed,
                ExecutionStatus::Success
            ]
        );
        assert!(ledger.read_all().unwrap().is_empty());
        assert_eq!(runtime.remaining(), 0);
    }

    #[tokio::test]
    async fn test_runtime_failure_gives_fixed_message() {
        let (_dir, _ledger, _runtime, agent) = setup(vec![
            ScriptStep::Fail("OpenAI API error (500): boom".to_string()),
            answer("Back online."),
        ]);
        let mut session = Session::new();

        let response = agent.execute_request(&mut session, "hello").await;
        assert!(!response.success);
        assert_eq!(response.output, FAILURE_MESSAGE);
        assert!(response.error.unwrap().contains("API"));

        let response = agent.execute_request(&mut session, "hello again").await;
        assert!(response.success);
        assert_eq!(response.output, "Back online.");
    }

    #[tokio::test]
    async fn test_round_limit() {
        let steps = (0..MAX_TOOL_ROUNDS + 1)
            .map(|i| call(&format!("c{i}"), "get_current_date", json!({})))
            .collect();
        let (_dir, _ledger, runtime, agent) = setup(steps);
        let mut session = Session::new();

        let response = agent.execute_request(&mut session, "loop forever").await;
        assert!(!response.success);
        assert_eq!(response.observations.len(), MAX_TOOL_ROUNDS);
        assert!(response.error.unwrap().contains("rounds"));
        assert_eq!(runtime.remaining(), 1);
    }

    #[tokio::test]
    async fn test_empty_request() {
        let (_dir, _ledger, runtime, agent) = setup(vec![]);
        let mut session = Session::new();
        let response = agent.execute_request(&mut session, "   ").await;
        assert!(!response.success);
        assert!(session.is_empty());
        assert!(runtime.conversations().is_empty());
    }
}
