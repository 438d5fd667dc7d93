pub mod complexity;
pub mod hotel;
pub mod openai;
pub mod providers;
pub mod retry;
pub mod runtime;
pub mod speech;
pub mod tools;

pub use complexity::{Complexity, classify};
pub use hotel::{HotelDirectory, StaticHotelDirectory, build_system_prompt};
pub use openai::OpenAiProvider;
pub use providers::{LlmProvider, LlmRequest, LlmResponse, ToolDefinition, Usage};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use runtime::{AgentRuntime, RuntimeSettings, TurnOutcome, TurnPath};
pub use speech::{HttpSpeechClient, SpeechToText, TextToSpeech};
pub use tools::{Tool, ToolContext, ToolOutput, ToolRegistry, hotel_skills};
