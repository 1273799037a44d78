//! LLM collaborator: a single-method completion interface plus adapters.
//!
//! Every LLM-backed stage (heading fallback, table features, target
//! arbitration) talks to a [`Completer`]: prompt in, text out. Retry on
//! *malformed* replies belongs to those stages; retry on *transport*
//! failures belongs here, inside [`ProviderCompleter`], so the stages see
//! one call that either answered or failed.
//!
//! ## Retry Strategy
//!
//! Provider errors under concurrent load are mostly transient (429/503).
//! Exponential backoff (`retry_backoff_ms * 2^attempt`) spaces the retries:
//! with 500 ms base and 2 retries the waits are 500 ms → 1 s.

use crate::config::SplitConfig;
use crate::error::LlmError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Text completion: one prompt in, the model's reply out.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    /// Tokens consumed so far, when the backend reports them.
    fn usage(&self) -> TokenUsage {
        TokenUsage::default()
    }
}

/// Prompt/completion token totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

// ── Provider adapter ─────────────────────────────────────────────────────

/// [`Completer`] over an edgequake-llm provider.
pub struct ProviderCompleter {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    retries: u32,
    backoff_ms: u64,
    timeout_secs: u64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

impl ProviderCompleter {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &SplitConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            retries: config.transport_retries,
            backoff_ms: config.retry_backoff_ms,
            timeout_secs: config.api_timeout_secs,
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
        }
    }

    fn options(&self) -> CompletionOptions {
        build_options(self.temperature, self.max_tokens)
    }
}

#[async_trait]
impl Completer for ProviderCompleter {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let start = Instant::now();
        let messages = request_messages(prompt);
        let options = self.options();
        let mut last_err = LlmError::EmptyReply;

        for attempt in 0..=self.retries {
            if attempt > 0 {
                let backoff = self.backoff_ms * 2u64.pow(attempt - 1);
                warn!("LLM retry {}/{} after {}ms", attempt, self.retries, backoff);
                sleep(Duration::from_millis(backoff)).await;
            }

            let call = self.provider.chat(&messages, Some(&options));
            match timeout(Duration::from_secs(self.timeout_secs), call).await {
                Ok(Ok(response)) => {
                    self.input_tokens
                        .fetch_add(response.prompt_tokens as u64, Ordering::Relaxed);
                    self.output_tokens
                        .fetch_add(response.completion_tokens as u64, Ordering::Relaxed);
                    debug!(
                        "LLM: {} input tokens, {} output tokens, {:?}",
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    if response.content.trim().is_empty() {
                        last_err = LlmError::EmptyReply;
                        continue;
                    }
                    return Ok(response.content);
                }
                Ok(Err(e)) => {
                    let message = e.to_string();
                    warn!("LLM: attempt {} failed: {}", attempt + 1, message);
                    last_err = LlmError::Api { message };
                }
                Err(_) => {
                    warn!("LLM: attempt {} timed out after {}s", attempt + 1, self.timeout_secs);
                    last_err = LlmError::Timeout {
                        secs: self.timeout_secs,
                    };
                }
            }
        }

        Err(last_err)
    }

    fn usage(&self) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
        }
    }
}

/// One user-role message per request; the prompt carries its own
/// instructions.
fn request_messages(prompt: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::user(prompt)]
}

/// Build `CompletionOptions` for short JSON replies.
fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

// ── Metering ─────────────────────────────────────────────────────────────

/// Counts calls and failures of an inner [`Completer`].
pub struct MeteredCompleter {
    inner: Arc<dyn Completer>,
    calls: AtomicUsize,
    failures: AtomicUsize,
}

impl MeteredCompleter {
    pub fn new(inner: Arc<dyn Completer>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Completer for MeteredCompleter {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let result = self.inner.complete(prompt).await;
        if result.is_err() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    fn usage(&self) -> TokenUsage {
        self.inner.usage()
    }
}

// ── Reply parsing ────────────────────────────────────────────────────────

static RE_THINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());

static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*\n?(.*?)\n?\s*```\s*$").unwrap());

static RE_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*[}\]])").unwrap());

/// Pull the JSON object out of a model reply.
///
/// Accepts a bare object, one wrapped in a code fence, one preceded by a
/// `<think>` block or prose, and objects with a trailing comma before the
/// closing brace (the prompt template itself shows one). Returns `None` for
/// anything else, including JSON that is not an object.
pub fn parse_json_object(reply: &str) -> Option<Value> {
    let text = RE_THINK.replace_all(reply, "");
    let text = match RE_FENCE.captures(&text) {
        Some(caps) => caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(),
        None => text.into_owned(),
    };
    let text = text.trim();

    if let Some(v) = parse_object(text) {
        return Some(v);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_object(&text[start..=end])
}

fn parse_object(text: &str) -> Option<Value> {
    let parsed = serde_json::from_str::<Value>(text)
        .ok()
        .or_else(|| serde_json::from_str::<Value>(&RE_TRAILING_COMMA.replace_all(text, "$1")).ok())?;
    parsed.is_object().then_some(parsed)
}

/// String value of the first present key, trimmed. Numbers are stringified.
pub fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match value.get(*k)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// List value of the first present key. A bare string becomes a one-item list.
pub fn list_field(value: &Value, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .find_map(|k| match value.get(*k)? {
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s.trim().to_string()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
            Value::String(s) if !s.trim().is_empty() => Some(vec![s.trim().to_string()]),
            _ => None,
        })
        .unwrap_or_default()
}
