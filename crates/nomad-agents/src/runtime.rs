use std::sync::{Arc, LazyLock};

use nomad_common::{Message, Result, Role};
use nomad_config::{AgentConfig, LlmConfig};
use nomad_store::SessionStore;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::complexity::{Complexity, classify};
use crate::hotel::{HotelDirectory, build_system_prompt};
use crate::providers::{LlmProvider, LlmRequest, LlmResponse, ToolDefinition};
use crate::retry::RetryPolicy;
use crate::tools::ToolRegistry;

/// Reply used when the model produced nothing but reasoning or whitespace.
const EMPTY_REPLY: &str = "I'm sorry, I couldn't put together an answer. Could you rephrase that?";

static THINK_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<think>.*?</think>").expect("think-block regex should compile")
});

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub model: String,
    pub temperature: Option<f64>,
    /// Upper bound on tool round-trips per turn.
    pub max_iterations: usize,
    pub completion_retry: RetryPolicy,
}

impl RuntimeSettings {
    pub fn from_config(llm: &LlmConfig, agent: &AgentConfig) -> Self {
        Self {
            model: llm.model.clone(),
            temperature: Some(llm.temperature),
            max_iterations: agent.max_iterations,
            completion_retry: RetryPolicy::new(agent.completion_retries, agent.backoff_base),
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default(), &AgentConfig::default())
    }
}

/// How a turn reached its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPath {
    /// The model answered without (more) tool calls.
    Direct,
    /// Tools were refused by the provider; answered by a tools-stripped retry.
    SchemaFallback,
    /// Tool-enabled completion kept failing; answered by a plain completion.
    PlainFallback,
    /// Iteration cap reached; answered by a forced plain completion.
    Exhausted,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub response: String,
    pub complexity: Complexity,
    pub iterations: usize,
    pub tool_calls: usize,
    pub path: TurnPath,
    /// The model gave no usable text and `response` is the stock apology.
    pub fallback_reply: bool,
}

/// Final assistant text and whether it replaced an empty model answer.
struct Reply {
    text: String,
    substituted: bool,
}

/// Runs one conversational turn against the model, executing requested
/// tools until the model answers or the iteration cap is hit.
pub struct AgentRuntime {
    provider: Arc<dyn LlmProvider>,
    tools: ToolRegistry,
    sessions: Arc<SessionStore>,
    hotels: Arc<dyn HotelDirectory>,
    settings: RuntimeSettings,
}

impl AgentRuntime {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: ToolRegistry,
        sessions: Arc<SessionStore>,
        hotels: Arc<dyn HotelDirectory>,
        settings: RuntimeSettings,
    ) -> Self {
        info!(
            provider = provider.provider_id(),
            tools = tools.len(),
            max_iterations = settings.max_iterations,
            "agent runtime ready"
        );
        Self {
            provider,
            tools,
            sessions,
            hotels,
            settings,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub fn provider_id(&self) -> &str {
        self.provider.provider_id()
    }

    pub async fn health_check(&self) -> bool {
        self.provider.health_check().await.unwrap_or(false)
    }

    /// System prompt for this hotel and language.
    pub fn system_prompt(&self, hotel_id: Option<&str>, language: &str) -> String {
        build_system_prompt(&self.hotels.profile(hotel_id), language)
    }

    /// Record a turn answered from the response cache so the session history
    /// stays in step with what the guest saw.
    pub fn record_cached_turn(
        &self,
        session_id: &str,
        user_text: &str,
        response: &str,
        hotel_id: Option<&str>,
        language: &str,
    ) {
        let system_prompt = self.system_prompt(hotel_id, language);
        self.sessions
            .begin_turn(session_id, &system_prompt, Message::user(user_text));
        self.sessions
            .append_messages(session_id, &[Message::assistant(response)]);
    }

    #[instrument(skip(self, user_text))]
    pub async fn process_turn(
        &self,
        session_id: &str,
        user_text: &str,
        hotel_id: Option<&str>,
        language: &str,
    ) -> Result<TurnOutcome> {
        let profile = self.hotels.profile(hotel_id);
        let system_prompt = build_system_prompt(&profile, language);
        let mut history =
            self.sessions
                .begin_turn(session_id, &system_prompt, Message::user(user_text));

        let complexity = classify(user_text);
        let max_tokens = complexity.max_tokens();
        if let Some(hint) = self.tools.route(user_text).first() {
            debug!(skill = %hint.tool, score = hint.score, ?complexity, "routing hint");
        }
        let tools = self.tools.definitions();
        let mut tool_calls = 0usize;

        let outcome = |reply: Reply, iterations: usize, tool_calls: usize, path| TurnOutcome {
            response: reply.text,
            complexity,
            iterations,
            tool_calls,
            path,
            fallback_reply: reply.substituted,
        };

        for iteration in 0..self.settings.max_iterations {
            let request = self.build_request(history.clone(), max_tokens, tools.clone());

            let response = match self.complete_with_retry(&request).await {
                Ok(response) => response,
                Err(err) if err.is_schema_rejection() => {
                    warn!(error = %err, "provider rejected tool schema, retrying without tools");
                    let response = self.provider.complete(&request.without_tools()).await?;
                    let reply = self.finalize(session_id, &response);
                    return Ok(outcome(reply, iteration + 1, tool_calls, TurnPath::SchemaFallback));
                }
                Err(err) if err.is_retryable() => {
                    warn!(
                        error = %err,
                        "completion failed after retries, falling back to plain completion"
                    );
                    let response = self.complete_with_retry(&request.without_tools()).await?;
                    let reply = self.finalize(session_id, &response);
                    return Ok(outcome(reply, iteration + 1, tool_calls, TurnPath::PlainFallback));
                }
                Err(err) => return Err(err),
            };

            if !response.has_tool_calls() {
                let reply = self.finalize(session_id, &response);
                return Ok(outcome(reply, iteration + 1, tool_calls, TurnPath::Direct));
            }

            let mut appended = Vec::with_capacity(response.tool_calls.len() + 1);
            appended.push(Message::assistant_tool_calls(
                response.text(),
                response.tool_calls.clone(),
            ));
            for call in &response.tool_calls {
                info!(tool = %call.name, call_id = %call.id, "executing requested tool");
                let output = self
                    .tools
                    .execute(
                        &call.name,
                        call.arguments.clone(),
                        session_id,
                        &profile,
                        language,
                    )
                    .await;
                appended.push(Message::tool_result(call.id.clone(), output.content));
                tool_calls += 1;
            }
            self.sessions.append_messages(session_id, &appended);
            history.extend(appended);
        }

        warn!(
            max_iterations = self.settings.max_iterations,
            "tool loop exhausted, forcing a plain answer"
        );
        let pruned = without_tool_exchanges(history);
        let request = self.build_request(pruned, max_tokens, Vec::new());
        let response = self.complete_with_retry(&request).await?;
        let reply = self.finalize(session_id, &response);
        Ok(outcome(
            reply,
            self.settings.max_iterations,
            tool_calls,
            TurnPath::Exhausted,
        ))
    }

    fn build_request(
        &self,
        messages: Vec<Message>,
        max_tokens: u32,
        tools: Vec<ToolDefinition>,
    ) -> LlmRequest {
        LlmRequest {
            model: self.settings.model.clone(),
            messages,
            max_tokens: Some(max_tokens),
            temperature: self.settings.temperature,
            tools,
        }
    }

    async fn complete_with_retry(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let provider = Arc::clone(&self.provider);
        self.settings
            .completion_retry
            .execute("chat_completion", || {
                let provider = Arc::clone(&provider);
                let request = request.clone();
                async move { provider.complete(&request).await }
            })
            .await
    }

    /// Strip reasoning, persist the assistant reply, and return it.
    fn finalize(&self, session_id: &str, response: &LlmResponse) -> Reply {
        let mut text = strip_think_blocks(response.text());
        let substituted = text.is_empty();
        if substituted {
            warn!("model returned an empty answer");
            text = EMPTY_REPLY.to_string();
        }
        self.sessions
            .append_messages(session_id, &[Message::assistant(text.clone())]);
        Reply { text, substituted }
    }
}

/// Remove `<think>...</think>` blocks and surrounding whitespace.
pub fn strip_think_blocks(text: &str) -> String {
    THINK_BLOCK.replace_all(text, "").trim().to_string()
}

/// Drop tool results and the assistant messages that requested them.
fn without_tool_exchanges(history: Vec<Message>) -> Vec<Message> {
    history
        .into_iter()
        .filter(|m| m.role != Role::Tool && !m.has_tool_calls())
        .collect()
}

impl std::fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("provider", &self.provider.provider_id())
            .field("tools", &self.tools.names())
            .field("settings", &self.settings)
            .finish()
    }
}
