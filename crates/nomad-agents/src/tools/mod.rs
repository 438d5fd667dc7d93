pub mod skills;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use nomad_common::{Error, Result};
use nomad_config::HotelProfile;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::providers::ToolDefinition;

pub use skills::{HotelSkill, hotel_skills};

/// Argument names that may carry the guest's request text, in lookup order.
const UTTERANCE_KEYS: [&str; 4] = ["request", "query", "issue", "destination"];

/// Per-call context handed to a tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub session_id: String,
    /// Guest text the tool should act on, pulled from the call arguments.
    pub utterance: String,
    pub hotel: HotelProfile,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
    /// Machine-readable label of what the tool did (e.g. `room_service_order`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            action: None,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
            action: None,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }
}

/// An action the model can request by name.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn input_schema(&self) -> Value;

    /// Sample guest phrasings, used for keyword routing.
    fn example_utterances(&self) -> &[&'static str] {
        &[]
    }

    async fn execute(&self, context: &ToolContext, args: Value) -> Result<ToolOutput>;
}

/// Scored match from [`ToolRegistry::route`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteMatch {
    pub tool: String,
    pub score: f64,
}

/// Name to tool mapping, fixed at startup.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!("tool '{name}' registered twice, keeping the latest");
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Schemas advertised to the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect()
    }

    /// Run a tool by name. Never fails: unknown tools and handler errors come
    /// back as error outputs so the model can see and recover from them.
    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        session_id: &str,
        hotel: &HotelProfile,
        language: &str,
    ) -> ToolOutput {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = name, "model requested unknown tool");
            return ToolOutput::error(format!("Error: unknown tool '{name}'"));
        };

        let context = ToolContext {
            session_id: session_id.to_string(),
            utterance: extract_utterance(&args),
            hotel: hotel.clone(),
            language: language.to_string(),
        };
        debug!(tool = name, session_id, "executing tool");

        match tool.execute(&context, args).await {
            Ok(output) => output,
            Err(err) => {
                let err = match err {
                    Error::ToolExecution(_) => err,
                    other => Error::ToolExecution(format!("{name}: {other}")),
                };
                warn!(tool = name, error = %err, "tool failed");
                ToolOutput::error(format!("Error: {err}"))
            }
        }
    }

    /// Rank tools by word overlap between `utterance` and their example
    /// utterances. Best match first; tools with no overlap are omitted.
    pub fn route(&self, utterance: &str) -> Vec<RouteMatch> {
        let words = word_set(utterance);
        let mut matches: Vec<RouteMatch> = self
            .tools
            .values()
            .filter_map(|tool| {
                let score = tool
                    .example_utterances()
                    .iter()
                    .map(|example| {
                        let example_words = word_set(example);
                        if example_words.is_empty() {
                            return 0.0;
                        }
                        let overlap = example_words.intersection(&words).count();
                        overlap as f64 / example_words.len() as f64
                    })
                    .fold(0.0_f64, f64::max);
                (score > 0.0).then(|| RouteMatch {
                    tool: tool.name().to_string(),
                    score,
                })
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches
    }
}

fn word_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Guest text from the first present key among `request`, `query`, `issue`
/// and `destination`. A bare string argument is used as-is.
pub fn extract_utterance(args: &Value) -> String {
    if let Value::String(raw) = args {
        return raw.clone();
    }
    UTTERANCE_KEYS
        .iter()
        .find_map(|key| args.get(key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_default()
}
