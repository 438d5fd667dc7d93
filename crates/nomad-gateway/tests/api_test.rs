use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use nomad_agents::{LlmProvider, LlmRequest, LlmResponse, SpeechToText, TextToSpeech};
use nomad_common::{Error, Result};
use nomad_config::AppConfig;
use nomad_gateway::{AppState, SharedState, build_router};
use serde_json::{Value, json};
use tower::ServiceExt;

type Script = dyn Fn(&LlmRequest) -> Result<LlmResponse> + Send + Sync;

/// Provider whose replies come from a closure; records every request.
struct ScriptedProvider {
    script: Box<Script>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedProvider {
    fn new(
        script: impl Fn(&LlmRequest) -> Result<LlmResponse> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn replying(text: &'static str) -> Arc<Self> {
        Self::new(move |_| {
            Ok(LlmResponse {
                content: Some(text.to_string()),
                ..LlmResponse::default()
            })
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn provider_id(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.requests.lock().unwrap().push(request.clone());
        (self.script)(request)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

struct FakeSpeech {
    transcript: &'static str,
    audio: Vec<u8>,
}

#[async_trait]
impl SpeechToText for FakeSpeech {
    async fn transcribe(&self, _audio_base64: &str, _language: Option<&str>) -> Result<String> {
        Ok(self.transcript.to_string())
    }
}

#[async_trait]
impl TextToSpeech for FakeSpeech {
    async fn synthesize(
        &self,
        _text: &str,
        _voice: Option<&str>,
        _language: Option<&str>,
    ) -> Result<Vec<u8>> {
        Ok(self.audio.clone())
    }
}

/// Speech backend that always fails with a retryable upstream error.
#[derive(Default)]
struct BrokenSpeech {
    attempts: AtomicUsize,
}

impl BrokenSpeech {
    fn failure(&self) -> Error {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Error::Upstream {
            status: 503,
            message: "speech backend unavailable".to_string(),
        }
    }
}

#[async_trait]
impl SpeechToText for BrokenSpeech {
    async fn transcribe(&self, _audio_base64: &str, _language: Option<&str>) -> Result<String> {
        Err(self.failure())
    }
}

#[async_trait]
impl TextToSpeech for BrokenSpeech {
    async fn synthesize(
        &self,
        _text: &str,
        _voice: Option<&str>,
        _language: Option<&str>,
    ) -> Result<Vec<u8>> {
        Err(self.failure())
    }
}

fn state_with(provider: Arc<ScriptedProvider>) -> SharedState {
    AppState::with_provider(AppConfig::default(), provider).into_shared()
}

async fn send(
    state: &SharedState,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = build_router(state.clone())
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn chat(state: &SharedState, body: Value) -> (StatusCode, Value) {
    send(state, "POST", "/api/chat", Some(body)).await
}

#[tokio::test]
async fn chat_returns_reply_and_generates_session_id() {
    let provider = ScriptedProvider::replying("Happy to help!");
    let state = state_with(provider.clone());

    let (status, body) = chat(&state, json!({"message": "Hello there, who are you?"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["response"], "Happy to help!");
    let session_id = body["session_id"].as_str().unwrap();
    assert_eq!(session_id.len(), 36);
    assert!(state.sessions.contains(session_id));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn repeated_faq_is_answered_from_cache() {
    let provider = ScriptedProvider::replying("Breakfast is served from 7 to 10 am.");
    let state = state_with(provider.clone());

    let (_, first) = chat(
        &state,
        json!({"message": "What time is breakfast?", "session_id": "guest-1"}),
    )
    .await;
    assert_eq!(first["cached"], false);

    let (_, before) = send(&state, "GET", "/api/metrics", None).await;
    let hits_before = before["cache"]["hits"].as_u64().unwrap();

    let (status, second) = chat(
        &state,
        json!({"message": "  what time is BREAKFAST?  ", "session_id": "guest-2"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["cached"], true);
    assert_eq!(second["response"], "Breakfast is served from 7 to 10 am.");

    let (_, after) = send(&state, "GET", "/api/metrics", None).await;
    assert_eq!(after["cache"]["hits"].as_u64().unwrap(), hits_before + 1);
    assert_eq!(provider.calls(), 1);

    // The cached turn is still part of the second guest's history.
    let history = state.sessions.get_messages("guest-2");
    assert_eq!(history.len(), 3);
    assert_eq!(history[2].content, "Breakfast is served from 7 to 10 am.");
}

#[tokio::test]
async fn twenty_first_request_in_window_is_rejected() {
    let state = state_with(ScriptedProvider::replying("The pool opens at 8."));
    let request = json!({"message": "When does the pool open?", "session_id": "busy-guest"});

    for _ in 0..20 {
        let (status, _) = chat(&state, request.clone()).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = chat(&state, request).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("Rate limit exceeded"));

    // Another guest is unaffected.
    let (status, _) = chat(
        &state,
        json!({"message": "When does the pool open?", "session_id": "calm-guest"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn empty_message_is_a_bad_request() {
    let provider = ScriptedProvider::replying("unused");
    let state = state_with(provider.clone());

    let (status, body) = chat(&state, json!({"message": "   "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = chat(&state, json!({"text": "wrong field"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = chat(&state, json!({"message": "hi", "session_id": "bad id!"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn provider_rejection_maps_to_bad_gateway() {
    let provider = ScriptedProvider::new(|_| {
        Err(Error::Schema {
            status: 400,
            message: "model does not support this request".to_string(),
        })
    });
    let state = state_with(provider.clone());

    let (status, body) = chat(
        &state,
        json!({"message": "Can you recommend a quiet restaurant nearby?"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
    assert!(!body["error"].as_str().unwrap().contains("model does not support"));
    // Tool-enabled call, then one tools-stripped retry.
    assert_eq!(provider.calls(), 2);

    let (_, metrics) = send(&state, "GET", "/api/metrics", None).await;
    assert_eq!(metrics["requests"]["counters"]["errors"], 1);
}

#[tokio::test]
async fn empty_model_answer_is_not_cached() {
    let calls = AtomicUsize::new(0);
    let provider = ScriptedProvider::new(move |_| {
        let content = if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            "<think>hmm</think>"
        } else {
            "The wifi password is guest123."
        };
        Ok(LlmResponse {
            content: Some(content.to_string()),
            ..LlmResponse::default()
        })
    });
    let state = state_with(provider.clone());

    let (status, first) = chat(
        &state,
        json!({"message": "What's the wifi password?", "session_id": "guest-a"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(first["response"], "The wifi password is guest123.");
    assert!(state.cache.is_empty());

    let (status, second) = chat(
        &state,
        json!({"message": "What's the wifi password?", "session_id": "guest-b"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["cached"], false);
    assert_eq!(second["response"], "The wifi password is guest123.");
    assert_eq!(provider.calls(), 2);
    assert_eq!(state.cache.len(), 1);
}

#[tokio::test]
async fn client_restored_answers_stay_out_of_shared_cache() {
    let provider = ScriptedProvider::replying("Checkout for your suite is at 1 pm.");
    let state = state_with(provider.clone());

    let (status, body) = chat(
        &state,
        json!({
            "message": "When is checkout?",
            "session_id": "restored-guest",
            "context": [
                {"role": "user", "content": "I booked the late checkout package."},
                {"role": "assistant", "content": "Noted, enjoy the extra time."}
            ]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "Checkout for your suite is at 1 pm.");
    assert!(state.cache.is_empty());

    let (status, other) = chat(
        &state,
        json!({"message": "When is checkout?", "session_id": "fresh-guest"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(other["cached"], false);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn reset_is_idempotent() {
    let state = state_with(ScriptedProvider::replying("Hi!"));
    chat(
        &state,
        json!({"message": "Hello, good evening!", "session_id": "room-204"}),
    )
    .await;
    assert!(state.sessions.contains("room-204"));

    let reset = json!({"session_id": "room-204"});
    let (status, first) = send(&state, "POST", "/api/reset", Some(reset.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["existed"], true);
    assert!(!state.sessions.contains("room-204"));

    let (status, second) = send(&state, "POST", "/api/reset", Some(reset)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["success"], true);
    assert_eq!(second["existed"], false);
}

#[tokio::test]
async fn client_context_restores_lost_history() {
    let provider = ScriptedProvider::replying("Of course, Ana.");
    let state = state_with(provider.clone());

    let (status, _) = send(
        &state,
        "POST",
        "/api/chat",
        Some(json!({
            "message": "Do you remember my name?",
            "session_id": "returning-guest",
            "context": [
                {"role": "user", "content": "My name is Ana."},
                {"role": "assistant", "content": "Nice to meet you, Ana."}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let requests = provider.requests.lock().unwrap();
    let sent: Vec<&str> = requests[0].messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(sent.len(), 4);
    assert_eq!(sent[1], "My name is Ana.");
    assert_eq!(sent[2], "Nice to meet you, Ana.");
    assert_eq!(sent[3], "Do you remember my name?");
}

#[tokio::test]
async fn voice_chat_round_trip() {
    let provider = ScriptedProvider::replying("Checkout is at 11 am.");
    let speech = Arc::new(FakeSpeech {
        transcript: "When is checkout?",
        audio: b"RIFFfake-wav".to_vec(),
    });
    let state = AppState::with_provider(AppConfig::default(), provider)
        .with_speech(speech.clone(), speech)
        .into_shared();

    let (status, body) = send(
        &state,
        "POST",
        "/api/voice-chat",
        Some(json!({
            "audio_base64": STANDARD.encode(b"pcm"),
            "session_id": "voice-1",
            "language": "en"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transcription"], "When is checkout?");
    assert_eq!(body["response"], "Checkout is at 11 am.");
    assert_eq!(body["audio_base64"], STANDARD.encode(b"RIFFfake-wav"));

    let (_, metrics) = send(&state, "GET", "/api/metrics", None).await;
    assert_eq!(metrics["requests"]["latency"]["stt"]["count"], 1);
    assert_eq!(metrics["requests"]["latency"]["tts"]["count"], 1);
}

#[tokio::test]
async fn voice_chat_validates_audio_and_configuration() {
    let state = state_with(ScriptedProvider::replying("unused"));

    let garbled = json!({"audio_base64": "***not base64***"});
    let (status, _) = send(&state, "POST", "/api/voice-chat", Some(garbled)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let audio = json!({"audio_base64": STANDARD.encode(b"pcm")});
    let (status, body) = send(&state, "POST", "/api/voice-chat", Some(audio)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
}

#[tokio::test(start_paused = true)]
async fn voice_chat_returns_text_when_synthesis_fails() {
    let provider = ScriptedProvider::replying("The spa opens at 9 am.");
    let stt = Arc::new(FakeSpeech {
        transcript: "When does the spa open?",
        audio: Vec::new(),
    });
    let tts = Arc::new(BrokenSpeech::default());
    let state = AppState::with_provider(AppConfig::default(), provider)
        .with_speech(stt, tts.clone())
        .into_shared();

    let audio = json!({"audio_base64": STANDARD.encode(b"pcm"), "session_id": "voice-2"});
    let (status, body) = send(&state, "POST", "/api/voice-chat", Some(audio)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["response"], "The spa opens at 9 am.");
    assert!(body["audio_base64"].is_null());
    // One attempt plus the configured retries.
    assert_eq!(tts.attempts.load(Ordering::SeqCst), 4);

    let (_, metrics) = send(&state, "GET", "/api/metrics", None).await;
    assert_eq!(metrics["requests"]["counters"]["tts_failures"], 1);
}

#[tokio::test(start_paused = true)]
async fn voice_chat_transcription_failure_is_bad_gateway() {
    let provider = ScriptedProvider::replying("unused");
    let stt = Arc::new(BrokenSpeech::default());
    let tts = Arc::new(FakeSpeech {
        transcript: "",
        audio: b"RIFF".to_vec(),
    });
    let state = AppState::with_provider(AppConfig::default(), provider.clone())
        .with_speech(stt.clone(), tts)
        .into_shared();

    let audio = json!({"audio_base64": STANDARD.encode(b"pcm"), "session_id": "voice-3"});
    let (status, body) = send(&state, "POST", "/api/voice-chat", Some(audio)).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
    assert_eq!(stt.attempts.load(Ordering::SeqCst), 4);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn transcribe_returns_text_only() {
    let provider = ScriptedProvider::replying("unused");
    let speech = Arc::new(FakeSpeech {
        transcript: "Is the gym open late?",
        audio: Vec::new(),
    });
    let state = AppState::with_provider(AppConfig::default(), provider.clone())
        .with_speech(speech.clone(), speech)
        .into_shared();

    let audio = json!({"audio_base64": STANDARD.encode(b"pcm"), "language": "en"});
    let (status, body) = send(&state, "POST", "/api/transcribe", Some(audio)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"text": "Is the gym open late?", "success": true}));
    assert_eq!(provider.calls(), 0);

    let (_, metrics) = send(&state, "GET", "/api/metrics", None).await;
    assert_eq!(metrics["requests"]["counters"]["transcribe_requests"], 1);
    assert_eq!(metrics["requests"]["latency"]["stt"]["count"], 1);
}

#[tokio::test]
async fn transcribe_validates_audio_and_configuration() {
    let state = state_with(ScriptedProvider::replying("unused"));

    let (status, body) = send(&state, "POST", "/api/transcribe", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let garbled = json!({"audio_base64": "***not base64***"});
    let (status, _) = send(&state, "POST", "/api/transcribe", Some(garbled)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let audio = json!({"audio_base64": STANDARD.encode(b"pcm")});
    let (status, body) = send(&state, "POST", "/api/transcribe", Some(audio)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
}

#[tokio::test(start_paused = true)]
async fn transcribe_failure_is_bad_gateway() {
    let speech = Arc::new(BrokenSpeech::default());
    let state = AppState::with_provider(AppConfig::default(), ScriptedProvider::replying("unused"))
        .with_speech(speech.clone(), speech)
        .into_shared();

    let audio = json!({"audio_base64": STANDARD.encode(b"pcm")});
    let (status, body) = send(&state, "POST", "/api/transcribe", Some(audio)).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn cache_clear_empties_cache() {
    let state = state_with(ScriptedProvider::replying("Parking is free for guests."));
    chat(&state, json!({"message": "Is parking free?"})).await;
    assert_eq!(state.cache.len(), 1);

    let (status, body) = send(&state, "POST", "/api/cache/clear", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], 1);
    assert!(state.cache.is_empty());
}

#[tokio::test]
async fn health_reports_provider_status() {
    let state = state_with(ScriptedProvider::replying("unused"));
    let (status, body) = send(&state, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["provider"], "scripted");
    assert_eq!(body["provider_healthy"], true);
    assert_eq!(body["tools"].as_array().unwrap().len(), 7);
}
