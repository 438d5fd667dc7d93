use std::sync::Arc;
use std::time::Duration;

use nomad_agents::{
    AgentRuntime, HttpSpeechClient, LlmProvider, OpenAiProvider, RetryPolicy, RuntimeSettings,
    SpeechToText, StaticHotelDirectory, TextToSpeech, ToolRegistry, hotel_skills,
};
use nomad_common::Result;
use nomad_config::AppConfig;
use nomad_security::{InputValidator, RateLimiter};
use nomad_store::{ResponseCache, SessionStore};
use tracing::{info, warn};

use crate::metrics::MetricsSink;

/// Shared state handed to every handler.
pub struct AppState {
    pub config: AppConfig,
    pub runtime: AgentRuntime,
    pub sessions: Arc<SessionStore>,
    pub cache: ResponseCache,
    pub limiter: RateLimiter,
    pub validator: InputValidator,
    pub metrics: MetricsSink,
    pub stt: Option<Arc<dyn SpeechToText>>,
    pub tts: Option<Arc<dyn TextToSpeech>>,
    pub speech_retry: RetryPolicy,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// State wired to the configured OpenAI-compatible provider and, when
    /// both URLs are set, the speech services.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let llm = &config.llm;
        if llm.api_key.is_none() {
            warn!("no LLM API key configured, requests are sent unauthenticated");
        }
        let provider = OpenAiProvider::with_timeouts(
            llm.api_key.clone().unwrap_or_default(),
            Some(llm.base_url.clone()),
            Duration::from_secs(llm.connect_timeout_secs),
            Duration::from_secs(llm.read_timeout_secs),
        )?;

        let speech_cfg = &config.speech;
        let speech = HttpSpeechClient::new(
            speech_cfg.stt_url.clone(),
            speech_cfg.tts_url.clone(),
            speech_cfg.api_key.clone(),
            Duration::from_secs(speech_cfg.connect_timeout_secs),
            Duration::from_secs(speech_cfg.read_timeout_secs),
        )?;

        let state = Self::with_provider(config, Arc::new(provider));
        if speech.is_configured() {
            let speech = Arc::new(speech);
            Ok(state.with_speech(speech.clone(), speech))
        } else {
            warn!("speech services not configured, voice chat is disabled");
            Ok(state)
        }
    }

    /// State around an arbitrary provider, without speech services.
    pub fn with_provider(config: AppConfig, provider: Arc<dyn LlmProvider>) -> Self {
        let sessions = Arc::new(SessionStore::new(
            Duration::from_secs(config.sessions.ttl_secs),
            config.sessions.sweep_threshold,
            config.sessions.restore_limit,
        ));

        let settings = RuntimeSettings::from_config(&config.llm, &config.agent);
        let mut tools = ToolRegistry::new();
        for skill in hotel_skills(
            Arc::clone(&provider),
            &settings.model,
            settings.completion_retry,
        ) {
            tools.register(skill);
        }
        let hotels = Arc::new(StaticHotelDirectory::new(config.hotels.clone()));
        let runtime = AgentRuntime::new(provider, tools, Arc::clone(&sessions), hotels, settings);

        let cache = ResponseCache::new(
            config.cache.max_size,
            Duration::from_secs(config.cache.ttl_secs),
        );
        let limiter = RateLimiter::new(
            config.rate_limit.per_session,
            config.rate_limit.global,
            Duration::from_secs(config.rate_limit.window_secs),
        );
        let validator = InputValidator::new(config.gateway.max_message_chars);
        let speech_retry =
            RetryPolicy::new(config.agent.speech_retries, config.agent.backoff_base);

        info!(
            hotels = config.hotels.len(),
            cache_size = config.cache.max_size,
            "gateway state initialized"
        );

        Self {
            config,
            runtime,
            sessions,
            cache,
            limiter,
            validator,
            metrics: MetricsSink::new(),
            stt: None,
            tts: None,
            speech_retry,
        }
    }

    pub fn with_speech(
        mut self,
        stt: Arc<dyn SpeechToText>,
        tts: Arc<dyn TextToSpeech>,
    ) -> Self {
        self.stt = Some(stt);
        self.tts = Some(tts);
        self
    }

    pub fn voice_enabled(&self) -> bool {
        self.stt.is_some() && self.tts.is_some()
    }

    pub fn into_shared(self) -> SharedState {
        Arc::new(self)
    }
}
