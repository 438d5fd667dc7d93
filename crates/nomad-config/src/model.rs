use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration. Every section falls back to its defaults when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub llm: LlmConfig,
    pub speech: SpeechConfig,
    pub agent: AgentConfig,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub sessions: SessionConfig,
    /// Hotel knowledge keyed by hotel id. `default` is used when a request
    /// names no hotel or an unknown one.
    pub hotels: HashMap<String, HotelProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Client text beyond this many characters is truncated before use.
    pub max_message_chars: usize,
    pub cors_permissive: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            max_message_chars: 2000,
            cors_permissive: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            connect_timeout_secs: 5,
            read_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub stt_url: Option<String>,
    pub tts_url: Option<String>,
    pub api_key: Option<String>,
    pub voice: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            stt_url: None,
            tts_url: None,
            api_key: None,
            voice: "alloy".to_string(),
            connect_timeout_secs: 5,
            read_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_iterations: usize,
    pub completion_retries: u32,
    pub speech_retries: u32,
    pub backoff_base: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            completion_retries: 2,
            speech_retries: 3,
            backoff_base: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub per_session: usize,
    pub global: usize,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_session: 20,
            global: 100,
            window_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_size: usize,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 500,
            ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_secs: u64,
    /// Live-session count above which an idle sweep runs.
    pub sweep_threshold: usize,
    /// Maximum number of client-echoed messages accepted on restore.
    pub restore_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 1800,
            sweep_threshold: 100,
            restore_limit: 20,
        }
    }
}

/// Read-only hotel facts folded into the system prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HotelProfile {
    pub name: String,
    pub location: String,
    pub check_in: String,
    pub check_out: String,
    pub wifi_network: String,
    pub wifi_password: String,
    /// Free-form facts (amenity hours, nearby places, policies).
    pub facts: Vec<String>,
}
