use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use nomad_agents::hotel::DEFAULT_HOTEL_ID;
use nomad_agents::{SpeechToText, TurnPath};
use nomad_common::{Error, Message};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::metrics::{
    AGENT_ANSWERS, CACHE_ANSWERS, CHAT_REQUESTS, ERRORS, FALLBACK_ANSWERS, RATE_LIMITED,
    RESET_REQUESTS, Stage, TOOL_CALLS, TRANSCRIBE_REQUESTS, TTS_FAILURES, VOICE_REQUESTS,
};
use crate::state::{AppState, SharedState};

const DEFAULT_LANGUAGE: &str = "en";

/// Handler failure, rendered as `{"success": false, "error": ...}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    RateLimited(String),
    BadGateway(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::RateLimited(msg)
            | ApiError::BadGateway(msg)
            | ApiError::Internal(msg) => msg,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(msg) => ApiError::BadRequest(msg),
            Error::RateLimited(msg) => ApiError::RateLimited(msg),
            Error::Transport(_)
            | Error::Timeout(_)
            | Error::Upstream { .. }
            | Error::Schema { .. } => {
                warn!(error = %err, "upstream failure");
                ApiError::BadGateway(err.user_message().to_string())
            }
            other => {
                warn!(error = %other, "internal failure");
                ApiError::Internal(other.user_message().to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(serde_json::json!({
                "success": false,
                "error": self.message(),
            })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub hotel_id: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    /// History echoed back by the client, used when the server has lost it.
    #[serde(default)]
    pub context: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub success: bool,
    pub session_id: String,
    pub cached: bool,
}

#[derive(Debug, Deserialize)]
pub struct VoiceChatRequest {
    pub audio_base64: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub hotel_id: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VoiceChatResponse {
    pub transcription: String,
    pub response: String,
    /// Synthesized WAV, base64-encoded. `None` when synthesis failed.
    pub audio_base64: Option<String>,
    pub success: bool,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TranscribeRequest {
    pub audio_base64: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub text: String,
    pub success: bool,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub session_id: String,
}

/// POST /api/chat
pub async fn chat(
    State(state): State<SharedState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    state.metrics.incr(CHAT_REQUESTS);
    let result = handle_chat(&state, payload).await;
    state.metrics.record_latency(Stage::Total, started.elapsed());
    respond(&state, result)
}

async fn handle_chat(
    state: &AppState,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<ChatResponse, ApiError> {
    let Json(body) = payload?;
    let session_id = resolve_session_id(state, body.session_id)?;
    admit(state, &session_id)?;

    let message = state.validator.sanitize_message(&body.message)?;
    let language = normalize_language(body.language.as_deref());
    let hotel_id = body.hotel_id.as_deref();

    state.sessions.maybe_sweep();
    if !body.context.is_empty() {
        let prompt = state.runtime.system_prompt(hotel_id, &language);
        state
            .sessions
            .restore_from_client(&session_id, &body.context, &prompt);
    }

    let (response, cached) = answer(state, &session_id, hotel_id, &language, &message).await?;
    Ok(ChatResponse {
        response,
        success: true,
        session_id,
        cached,
    })
}

/// POST /api/voice-chat
pub async fn voice_chat(
    State(state): State<SharedState>,
    payload: Result<Json<VoiceChatRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    state.metrics.incr(VOICE_REQUESTS);
    let result = handle_voice_chat(&state, payload).await;
    state.metrics.record_latency(Stage::Total, started.elapsed());
    respond(&state, result)
}

async fn handle_voice_chat(
    state: &AppState,
    payload: Result<Json<VoiceChatRequest>, JsonRejection>,
) -> Result<VoiceChatResponse, ApiError> {
    let Json(body) = payload?;
    let audio = checked_audio(&body.audio_base64)?;
    let (Some(stt), Some(tts)) = (state.stt.clone(), state.tts.clone()) else {
        return Err(ApiError::Internal(
            "Voice chat is not configured on this server.".to_string(),
        ));
    };

    let session_id = resolve_session_id(state, body.session_id)?;
    admit(state, &session_id)?;
    let language = normalize_language(body.language.as_deref());
    let hotel_id = body.hotel_id.as_deref();

    let transcription = transcribe_with_retry(state, stt, audio, &language).await?;
    let message = state.validator.sanitize_message(&transcription)?;

    state.sessions.maybe_sweep();
    let (response, _) = answer(state, &session_id, hotel_id, &language, &message).await?;

    let voice = body
        .voice
        .clone()
        .unwrap_or_else(|| state.config.speech.voice.clone());
    let tts_started = Instant::now();
    let synthesized = state
        .speech_retry
        .execute("text_to_speech", || {
            let tts = Arc::clone(&tts);
            let text = response.clone();
            let voice = voice.clone();
            let language = language.clone();
            async move { tts.synthesize(&text, Some(&voice), Some(&language)).await }
        })
        .await;
    state
        .metrics
        .record_latency(Stage::Tts, tts_started.elapsed());

    let audio_base64 = match synthesized {
        Ok(bytes) => Some(STANDARD.encode(bytes)),
        Err(err) => {
            warn!(
                error = %err,
                session_id = %session_id,
                "speech synthesis failed, returning text only"
            );
            state.metrics.incr(TTS_FAILURES);
            None
        }
    };

    Ok(VoiceChatResponse {
        transcription: message,
        response,
        audio_base64,
        success: true,
        session_id,
    })
}

/// POST /api/transcribe
pub async fn transcribe(
    State(state): State<SharedState>,
    payload: Result<Json<TranscribeRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    state.metrics.incr(TRANSCRIBE_REQUESTS);
    let result = handle_transcribe(&state, payload).await;
    state.metrics.record_latency(Stage::Total, started.elapsed());
    respond(&state, result)
}

async fn handle_transcribe(
    state: &AppState,
    payload: Result<Json<TranscribeRequest>, JsonRejection>,
) -> Result<TranscribeResponse, ApiError> {
    let Json(body) = payload?;
    let audio = checked_audio(&body.audio_base64)?;
    let Some(stt) = state.stt.clone() else {
        return Err(ApiError::Internal(
            "Transcription is not configured on this server.".to_string(),
        ));
    };

    let session_id = resolve_session_id(state, body.session_id)?;
    admit(state, &session_id)?;
    let language = normalize_language(body.language.as_deref());

    let text = transcribe_with_retry(state, stt, audio, &language).await?;
    Ok(TranscribeResponse {
        text,
        success: true,
    })
}

/// Trimmed audio payload, rejected when empty or not base64.
fn checked_audio(audio_base64: &str) -> Result<String, ApiError> {
    let audio = audio_base64.trim();
    if audio.is_empty() {
        return Err(ApiError::BadRequest("audio_base64 is required".to_string()));
    }
    if STANDARD.decode(audio).is_err() {
        return Err(ApiError::BadRequest(
            "audio_base64 is not valid base64".to_string(),
        ));
    }
    Ok(audio.to_string())
}

async fn transcribe_with_retry(
    state: &AppState,
    stt: Arc<dyn SpeechToText>,
    audio: String,
    language: &str,
) -> Result<String, ApiError> {
    let started = Instant::now();
    let transcription = state
        .speech_retry
        .execute("speech_to_text", || {
            let stt = Arc::clone(&stt);
            let audio = audio.clone();
            let language = language.to_string();
            async move { stt.transcribe(&audio, Some(&language)).await }
        })
        .await;
    state.metrics.record_latency(Stage::Stt, started.elapsed());
    Ok(transcription?)
}

/// POST /api/reset
pub async fn reset(
    State(state): State<SharedState>,
    payload: Result<Json<ResetRequest>, JsonRejection>,
) -> Response {
    state.metrics.incr(RESET_REQUESTS);
    let result = handle_reset(&state, payload);
    respond(&state, result)
}

fn handle_reset(
    state: &AppState,
    payload: Result<Json<ResetRequest>, JsonRejection>,
) -> Result<serde_json::Value, ApiError> {
    let Json(body) = payload?;
    state.validator.validate_session_id(&body.session_id)?;
    let existed = state.sessions.reset(&body.session_id);
    info!(session_id = %body.session_id, existed, "session reset");
    Ok(serde_json::json!({
        "success": true,
        "session_id": body.session_id,
        "existed": existed,
    }))
}

/// GET /api/metrics
pub async fn metrics(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "requests": state.metrics.snapshot(),
        "cache": state.cache.stats(),
        "sessions": {
            "active": state.sessions.len(),
        },
        "rate_limiter": {
            "tracked_scopes": state.limiter.tracked_scopes(),
        },
        "voice_enabled": state.voice_enabled(),
    }))
}

/// POST /api/cache/clear
pub async fn clear_cache(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let cleared = state.cache.clear();
    info!(cleared, "response cache cleared");
    Json(serde_json::json!({
        "success": true,
        "cleared": cleared,
    }))
}

/// Answer from the response cache when possible, otherwise run an agent turn
/// and cache the result. Returns the reply and whether it came from cache.
async fn answer(
    state: &AppState,
    session_id: &str,
    hotel_id: Option<&str>,
    language: &str,
    message: &str,
) -> Result<(String, bool), ApiError> {
    let scope = format!("{}:{language}", hotel_id.unwrap_or(DEFAULT_HOTEL_ID));
    if let Some(hit) = state.cache.get(&scope, message) {
        debug!(session_id, scope = %scope, "answered from cache");
        state
            .runtime
            .record_cached_turn(session_id, message, &hit, hotel_id, language);
        state.metrics.incr(CACHE_ANSWERS);
        return Ok((hit, true));
    }

    let started = Instant::now();
    let outcome = state
        .runtime
        .process_turn(session_id, message, hotel_id, language)
        .await;
    state
        .metrics
        .record_latency(Stage::Agent, started.elapsed());
    let outcome = outcome?;

    state.metrics.incr(AGENT_ANSWERS);
    state.metrics.add(TOOL_CALLS, outcome.tool_calls as u64);
    if outcome.path != TurnPath::Direct {
        state.metrics.incr(FALLBACK_ANSWERS);
    }
    // The cache is shared by every guest in the scope, so only answers built
    // from server-side history and real model text go into it.
    if outcome.fallback_reply || state.sessions.is_client_restored(session_id) {
        debug!(session_id, "reply not cacheable");
    } else if state.cache.set(&scope, message, &outcome.response) {
        debug!(session_id, scope = %scope, "cached reply");
    }
    Ok((outcome.response, false))
}

fn resolve_session_id(state: &AppState, requested: Option<String>) -> Result<String, ApiError> {
    match requested.filter(|id| !id.trim().is_empty()) {
        Some(id) => {
            state.validator.validate_session_id(&id)?;
            Ok(id)
        }
        None => Ok(Uuid::new_v4().to_string()),
    }
}

fn admit(state: &AppState, session_id: &str) -> Result<(), ApiError> {
    let admission = state.limiter.admit(session_id);
    if admission.allowed {
        return Ok(());
    }
    state.metrics.incr(RATE_LIMITED);
    Err(ApiError::RateLimited(admission.reason.unwrap_or_else(|| {
        "Too many requests. Please wait a moment and try again.".to_string()
    })))
}

fn normalize_language(language: Option<&str>) -> String {
    language
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())
}

fn respond<T: Serialize>(state: &AppState, result: Result<T, ApiError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => {
            state.metrics.incr(ERRORS);
            err.into_response()
        }
    }
}
