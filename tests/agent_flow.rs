//! Full request loop against a local stand-in for the chat completions API

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use chrono::NaiveDate;
use finance_tracker_agent::agent::{FinanceAgent, FAILURE_MESSAGE};
use finance_tracker_agent::clock::FixedClock;
use finance_tracker_agent::ledger::Ledger;
use finance_tracker_agent::memory::Session;
use finance_tracker_agent::runtime::OpenAiRuntime;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct MockApi {
    replies: Arc<Mutex<VecDeque<(StatusCode, Value)>>>,
    requests: Arc<Mutex<Vec<Value>>>,
}

async fn chat_completions(
    State(api): State<MockApi>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        != Some("Bearer sk-test")
    {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "bad key" })));
    }

    api.requests.lock().unwrap().push(body);
    let next = api.replies.lock().unwrap().pop_front();
    match next {
        Some((status, reply)) => (status, Json(reply)),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "no scripted reply" })),
        ),
    }
}

async fn serve(replies: Vec<(StatusCode, Value)>) -> (String, MockApi) {
    let api = MockApi::default();
    api.replies.lock().unwrap().extend(replies);

    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(api.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/v1", addr), api)
}

fn tool_call(id: &str, name: &str, arguments: Value) -> (StatusCode, Value) {
    (
        StatusCode::OK,
        json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": id,
                        "type": "function",
                        "function": { "name": name, "arguments": arguments.to_string() }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 420, "completion_tokens": 31 }
        }),
    )
}

fn answer(text: &str) -> (StatusCode, Value) {
    (
        StatusCode::OK,
        json!({
            "choices": [{
                "message": { "content": text },
                "finish_reason": "stop"
            }]
        }),
    )
}

fn agent(base_url: String, dir: &TempDir) -> (Arc<Ledger>, FinanceAgent) {
    let ledger = Arc::new(Ledger::new(dir.path().join("expenses.csv")));
    ledger.ensure_exists().unwrap();
    let runtime = OpenAiRuntime::new(
        "sk-test".to_string(),
        "gpt-3.5-turbo".to_string(),
        Some(base_url),
    )
    .unwrap();
    let clock = Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 8, 20).unwrap()));
    let agent = FinanceAgent::for_ledger(Arc::new(runtime), ledger.clone(), clock);
    (ledger, agent)
}

#[tokio::test]
async fn dinner_is_saved_then_corrected() {
    let (base_url, api) = serve(vec![
        tool_call(
            "call_1",
            "save_expense",
            json!({
                "main_category": "Restaurant Night",
                "sub_category": "Restaurant - Enjoyment",
                "amount": 56,
                "notes": "Add new expense in a restaurant 56 euros today"
            }),
        ),
        answer("✅ Expense successfully saved."),
        tool_call("call_2", "update_last_expense", json!({ "sub_category": "Drinks" })),
        answer("Done, it is now filed under Drinks."),
    ])
    .await;
    let dir = TempDir::new().unwrap();
    let (ledger, agent) = agent(base_url, &dir);
    let mut session = Session::new();

    let response = agent
        .execute_request(&mut session, "Add new expense in a restaurant 56 euros today")
        .await;
    assert!(response.success, "{:?}", response.error);
    assert_eq!(response.observations.len(), 1);

    let response = agent
        .execute_request(&mut session, "the last expense was drinks, not dinner")
        .await;
    assert!(response.success, "{:?}", response.error);
    assert_eq!(response.output, "Done, it is now filed under Drinks.");

    let rows = ledger.read_all().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].year, 2024);
    assert_eq!(rows[0].month, 8);
    assert_eq!(rows[0].account, "Main Account");
    assert_eq!(rows[0].sub_category, "Drinks");
    assert_eq!(rows[0].amount, dec!(56));

    let requests = api.requests.lock().unwrap();
    assert_eq!(requests.len(), 4);

    let first = &requests[0];
    assert_eq!(first["model"], "gpt-3.5-turbo");
    assert_eq!(first["messages"][0]["role"], "system");
    let tool_names: Vec<&str> = first["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["function"]["name"].as_str())
        .collect();
    assert!(tool_names.contains(&"save_expense"));
    assert!(tool_names.contains(&"get_spending_summary"));

    // The second round carries the tool result back under the call id
    let tool_message = requests[1]["messages"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["role"] == "tool")
        .cloned()
        .unwrap();
    assert_eq!(tool_message["tool_call_id"], "call_1");
    assert!(tool_message["content"]
        .as_str()
        .unwrap()
        .contains("Restaurant Night"));

    // The follow-up request still sees the earlier exchange
    let history = requests[2]["messages"].as_array().unwrap();
    assert!(history
        .iter()
        .any(|m| m["content"] == "Add new expense in a restaurant 56 euros today"));
}

#[tokio::test]
async fn api_failure_yields_fixed_message_and_session_recovers() {
    let (base_url, _api) = serve(vec![
        (
            StatusCode::TOO_MANY_REQUESTS,
            json!({ "error": { "message": "Rate limit reached" } }),
        ),
        answer("Hello again."),
    ])
    .await;
    let dir = TempDir::new().unwrap();
    let (_ledger, agent) = agent(base_url, &dir);
    let mut session = Session::new();

    let response = agent.execute_request(&mut session, "hi").await;
    assert!(!response.success);
    assert_eq!(response.output, FAILURE_MESSAGE);
    let error = response.error.unwrap();
    assert!(error.contains("OpenAI API error (429"), "{}", error);
    assert!(error.contains("Rate limit reached"));

    let response = agent.execute_request(&mut session, "hi").await;
    assert!(response.success);
    assert_eq!(response.output, "Hello again.");
}

#[tokio::test]
async fn sessions_do_not_share_history() {
    let (base_url, api) = serve(vec![answer("one"), answer("two")]).await;
    let dir = TempDir::new().unwrap();
    let (_ledger, agent) = agent(base_url, &dir);

    let mut alice = Session::new();
    let mut bob = Session::new();
    agent.execute_request(&mut alice, "first from alice").await;
    agent.execute_request(&mut bob, "first from bob").await;

    let requests = api.requests.lock().unwrap();
    let bob_messages = requests[1]["messages"].as_array().unwrap();
    assert!(!bob_messages
        .iter()
        .any(|m| m["content"] == "first from alice"));
    assert_eq!(alice.message_count(), 2);
    assert_eq!(bob.message_count(), 2);
}
