//! Telegram bot interface
//!
//! Webhook server for incoming updates plus a small Bot API client for
//! replies. Updates are acknowledged at once and answered from a background
//! task; redelivered update ids are dropped. One session per chat; a chat's
//! turns run one at a time while different chats proceed concurrently.

use crate::agent::FinanceAgent;
use crate::error::FinanceError;
use crate::interface::feedback::{MessageFormatter, TELEGRAM_HELP, TELEGRAM_WELCOME};
use crate::memory::Session;
use crate::Result;
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";
pub const WEBHOOK_PATH: &str = "/telegram/webhook";

const API_BASE: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Raw characters per outgoing message; escaping at most doubles them,
/// which stays under Telegram's 4096 limit.
const MAX_CHUNK_CHARS: usize = 2000;
/// Update ids remembered for dropping redeliveries
const RECENT_UPDATE_CAPACITY: usize = 1024;

const MARKDOWN_V2_SPECIAL: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Escape text so Telegram renders it literally under MarkdownV2
pub fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + text.len() / 4);
    for c in text.chars() {
        if c == '\\' || MARKDOWN_V2_SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Split a long reply into pieces of at most `max_chars`, preferring line breaks
fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        for c in line.chars() {
            if current_len == max_chars {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current.push(c);
            current_len += 1;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Session id derived from the chat id, stable across restarts
fn stable_uuid_from_string(input: &str) -> Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}

// ===== Bot API client =====

/// Outgoing side of the bot
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send already-escaped MarkdownV2 text
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Debug, Serialize)]
struct SetWebhookRequest<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_token: Option<&'a str>,
    allowed_updates: [&'static str; 1],
}

#[derive(Debug, Deserialize)]
struct BotApiResponse {
    ok: bool,
    description: Option<String>,
}

/// Reusable Bot API client (connection-pooled)
pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Result<Self> {
        Self::with_api_base(token, API_BASE)
    }

    pub fn with_api_base(token: &str, api_base: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FinanceError::Configuration(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        })
    }

    async fn call<T: Serialize + ?Sized>(&self, method: &str, body: &T) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(body)
            .send()
            .await
            // The URL carries the bot token; keep it out of errors and logs.
            .map_err(|e| {
                FinanceError::Upstream(format!(
                    "Telegram API {} failed: {}",
                    method,
                    e.without_url()
                ))
            })?;

        let status = response.status();
        let reply: BotApiResponse = response.json().await.map_err(|e| {
            FinanceError::Upstream(format!(
                "Telegram API {} returned an unreadable response ({}): {}",
                method,
                status,
                e.without_url()
            ))
        })?;

        if !reply.ok {
            return Err(FinanceError::Upstream(format!(
                "Telegram API {} rejected the request ({}): {}",
                method,
                status,
                reply.description.unwrap_or_default()
            )));
        }

        Ok(())
    }

    /// Point Telegram at this server's webhook
    pub async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> Result<()> {
        self.call(
            "setWebhook",
            &SetWebhookRequest {
                url,
                secret_token,
                allowed_updates: ["message"],
            },
        )
        .await?;
        info!(%url, "Telegram webhook registered");
        Ok(())
    }
}

#[async_trait]
impl MessageSender for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        self.call(
            "sendMessage",
            &SendMessageRequest {
                chat_id,
                text,
                parse_mode: "MarkdownV2",
            },
        )
        .await
    }
}

// ===== Incoming updates =====

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// What an incoming text asks for
#[derive(Debug, Clone, PartialEq, Eq)]
enum Incoming<'a> {
    Start,
    Help,
    OtherCommand,
    Text(&'a str),
}

fn classify(text: &str) -> Incoming<'_> {
    let text = text.trim();
    let Some(command) = text.strip_prefix('/') else {
        return Incoming::Text(text);
    };

    // "/start@my_bot args" → "start"
    let name = command
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .split('@')
        .next()
        .unwrap_or_default();

    match name {
        "start" => Incoming::Start,
        "help" => Incoming::Help,
        _ => Incoming::OtherCommand,
    }
}

// ===== Webhook server =====

/// Bounded memory of the update ids already accepted
#[derive(Debug, Default)]
struct RecentUpdates {
    order: VecDeque<i64>,
    seen: HashSet<i64>,
}

impl RecentUpdates {
    /// False when `update_id` was accepted before
    fn insert(&mut self, update_id: i64) -> bool {
        if !self.seen.insert(update_id) {
            return false;
        }
        self.order.push_back(update_id);
        if self.order.len() > RECENT_UPDATE_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

#[derive(Clone)]
pub struct TelegramState {
    agent: Arc<FinanceAgent>,
    sender: Arc<dyn MessageSender>,
    sessions: Arc<Mutex<HashMap<i64, Arc<tokio::sync::Mutex<Session>>>>>,
    recent_updates: Arc<Mutex<RecentUpdates>>,
    secret_token: Option<String>,
    verbose: bool,
}

impl TelegramState {
    pub fn new(
        agent: Arc<FinanceAgent>,
        sender: Arc<dyn MessageSender>,
        secret_token: Option<String>,
        verbose: bool,
    ) -> Self {
        Self {
            agent,
            sender,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            recent_updates: Arc::new(Mutex::new(RecentUpdates::default())),
            secret_token,
            verbose,
        }
    }

    fn session_for(&self, chat_id: i64) -> Result<Arc<tokio::sync::Mutex<Session>>> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| FinanceError::Storage("session map lock poisoned".to_string()))?;

        let session = sessions.entry(chat_id).or_insert_with(|| {
            let id = stable_uuid_from_string(&format!("telegram:{}", chat_id));
            debug!(chat_id, session_id = %id, "New chat session");
            Arc::new(tokio::sync::Mutex::new(Session::with_id(id)))
        });
        Ok(session.clone())
    }

    /// Number of chats with a session
    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// True the first time an update id is seen
    fn first_delivery(&self, update_id: i64) -> bool {
        self.recent_updates
            .lock()
            .map(|mut recent| recent.insert(update_id))
            .unwrap_or(true)
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        match &self.secret_token {
            None => true,
            Some(expected) => headers
                .get(SECRET_HEADER)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == expected),
        }
    }

    /// Reply text for one incoming message, `None` when it is ignored
    async fn reply_to(&self, chat_id: i64, text: &str) -> Option<String> {
        match classify(text) {
            Incoming::Start => Some(TELEGRAM_WELCOME.to_string()),
            Incoming::Help => Some(TELEGRAM_HELP.to_string()),
            Incoming::OtherCommand => None,
            Incoming::Text("") => None,
            Incoming::Text(request) => {
                let response = match self.session_for(chat_id) {
                    Ok(session) => {
                        let mut session = session.lock().await;
                        self.agent.execute_request(&mut session, request).await
                    }
                    Err(e) => {
                        error!(chat_id, error = %e, "Cannot open chat session");
                        return Some(MessageFormatter::error(
                            crate::agent::FAILURE_MESSAGE,
                            None,
                        ));
                    }
                };
                Some(MessageFormatter::response(&response, self.verbose))
            }
        }
    }

    async fn deliver(&self, chat_id: i64, reply: &str) {
        for chunk in split_message(reply, MAX_CHUNK_CHARS) {
            if let Err(e) = self
                .sender
                .send_message(chat_id, &escape_markdown_v2(&chunk))
                .await
            {
                warn!(chat_id, error = %e, "Failed to send Telegram reply");
                return;
            }
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Acknowledge with 200 before the agent runs, so a slow reply never makes
/// Telegram redeliver the update
async fn webhook(State(state): State<TelegramState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    if !state.authorized(&headers) {
        warn!("Rejected webhook call with missing or wrong secret token");
        return StatusCode::UNAUTHORIZED;
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable update");
            return StatusCode::OK;
        }
    };

    if !state.first_delivery(update.update_id) {
        info!(update_id = update.update_id, "Dropping redelivered update");
        return StatusCode::OK;
    }

    let Some(message) = update.message else {
        debug!(update_id = update.update_id, "Ignoring update without message");
        return StatusCode::OK;
    };
    let Some(text) = message.text else {
        debug!(update_id = update.update_id, "Ignoring non-text message");
        return StatusCode::OK;
    };

    let chat_id = message.chat.id;
    debug!(
        update_id = update.update_id,
        message_id = message.message_id,
        chat_id,
        "Telegram message received"
    );

    tokio::spawn(async move {
        if let Some(reply) = state.reply_to(chat_id, &text).await {
            state.deliver(chat_id, &reply).await;
        }
    });

    StatusCode::OK
}

pub fn create_router(state: TelegramState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(WEBHOOK_PATH, post(webhook))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Serve the webhook until Ctrl-C
pub async fn start_server(state: TelegramState, port: u16) -> Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("Telegram webhook listening on http://0.0.0.0:{}{}", port, WEBHOOK_PATH);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Settings for the Telegram interface
#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub token: String,
    pub port: u16,
    pub webhook_url: Option<String>,
    pub secret_token: Option<String>,
    pub verbose: bool,
}

/// Register the webhook when a public URL is known, then serve
pub async fn run_telegram(agent: FinanceAgent, settings: TelegramSettings) -> Result<()> {
    let client = Arc::new(TelegramClient::new(&settings.token)?);

    if let Some(url) = &settings.webhook_url {
        let full_url = format!("{}{}", url.trim_end_matches('/'), WEBHOOK_PATH);
        client
            .set_webhook(&full_url, settings.secret_token.as_deref())
            .await?;
    } else {
        warn!(
            "No webhook URL configured: the bot only receives updates if a webhook \
             was registered earlier (pass --webhook-url or set TG_WEBHOOK_URL)"
        );
    }

    let state = TelegramState::new(
        Arc::new(agent),
        client,
        settings.secret_token,
        settings.verbose,
    );
    start_server(state, settings.port).await
}
