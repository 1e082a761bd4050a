//! HTTP API server for chat front-ends and agent consoles.

use super::check_ready;
use crate::chat::{ConversationSession, ToolObservation};
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::error::ParleyError;
use crate::llm::Usage;
use crate::service::SupportService;
use crate::speech::{strip_citations, OpenAISpeech, SpeechToText, TextToSpeech};
use crate::store::ConversationDocument;
use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Shared state for handlers.
pub struct AppState {
    pub service: SupportService,
    pub transcriber: Option<Arc<dyn SpeechToText>>,
    pub speaker: Option<Arc<dyn TextToSpeech>>,
}

/// Run the HTTP API server.
pub async fn run_serve(host: Option<String>, port: Option<u16>, settings: Settings) -> Result<()> {
    check_ready(Operation::Chat)?;
    for warning in preflight::warnings(&settings) {
        Output::warning(&warning);
    }

    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);

    let speech = Arc::new(OpenAISpeech::from_settings(
        &settings.speech,
        settings.llm.api_base.as_deref(),
        settings.llm.request_timeout(),
    )?);
    let transcriber: Arc<dyn SpeechToText> = speech.clone();
    let speaker: Arc<dyn TextToSpeech> = speech;
    let service = SupportService::from_settings(settings)?;

    let state = Arc::new(AppState {
        service,
        transcriber: Some(transcriber),
        speaker: Some(speaker),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state).layer(cors);

    let addr = format!("{}:{}", host, port);
    Output::success(&format!("Starting Parley API server on http://{}", addr));
    println!();
    Output::kv("Health", &format!("GET  http://{}/health", addr));
    Output::kv("New session", &format!("POST http://{}/sessions", addr));
    Output::kv("Session", &format!("GET  http://{}/sessions/{{id}}", addr));
    Output::kv("Turn", &format!("POST http://{}/sessions/{{id}}/turns", addr));
    Output::kv("Finalize", &format!("POST http://{}/sessions/{{id}}/finalize", addr));
    Output::kv("Summary", &format!("GET  http://{}/customers/{{id}}/summary", addr));
    Output::kv("Reply", &format!("GET  http://{}/customers/{{id}}/reply", addr));
    Output::kv("Agent turn", &format!("POST http://{}/agent-sessions/{{id}}/turns", addr));
    Output::kv("Transcribe", &format!("POST http://{}/transcribe", addr));
    Output::kv("Speech", &format!("POST http://{}/speech", addr));
    println!();
    Output::info("Press Ctrl+C to stop");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// All API routes over the given state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/turns", post(post_turn))
        .route("/sessions/{id}/finalize", post(finalize))
        .route("/customers/{id}/summary", get(summary))
        .route("/customers/{id}/reply", get(reply))
        .route("/agent-sessions/{id}/turns", post(post_agent_turn))
        .route("/transcribe", post(transcribe))
        .route("/speech", post(speech))
        .with_state(state)
}

// === Errors ===

struct ApiError(ParleyError);

impl From<ParleyError> for ApiError {
    fn from(e: ParleyError) -> Self {
        Self(e)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ParleyError::NotFound(_) => StatusCode::NOT_FOUND,
            ParleyError::InvalidInput(_) | ParleyError::InvalidArguments(_) => StatusCode::BAD_REQUEST,
            ParleyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ParleyError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// === Request/Response types ===

#[derive(Deserialize)]
struct CreateSessionRequest {
    customer_id: String,
}

#[derive(Deserialize)]
struct TurnRequest {
    message: String,
    /// Needed only when the session has not been stored yet.
    customer_id: Option<String>,
}

#[derive(Serialize)]
struct TurnResponse {
    session_id: String,
    answer: String,
    tool_calls: Vec<ToolObservation>,
    usage: Usage,
}

#[derive(Deserialize, Default)]
struct FinalizeRequest {
    agent_id: Option<u32>,
}

#[derive(Serialize)]
struct AgentTurnResponse {
    session_id: String,
    customer_reply: String,
    suggested_reply: String,
}

#[derive(Deserialize, Default)]
struct ReplyQuery {
    #[serde(default)]
    simulate: bool,
    /// Agent session to continue from.
    session: Option<String>,
}

#[derive(Serialize)]
struct TextResponse {
    text: String,
}

#[derive(Deserialize, Default)]
struct TranscribeQuery {
    file_name: Option<String>,
}

#[derive(Deserialize)]
struct SpeechRequest {
    text: String,
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<ConversationSession>)> {
    if req.customer_id.trim().is_empty() {
        return Err(ParleyError::InvalidInput("customer_id is required".to_string()).into());
    }
    let session = state.service.start_session(&req.customer_id);
    info!("Created session {} for customer {}", session.session_id, session.subject_id);
    Ok((StatusCode::CREATED, Json(session)))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ConversationDocument>> {
    let doc = state
        .service
        .conversations()
        .read(&id)
        .await?
        .ok_or_else(|| ParleyError::NotFound(format!("conversation {}", id)))?;
    Ok(Json(doc))
}

async fn post_turn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<TurnRequest>,
) -> ApiResult<Json<TurnResponse>> {
    let session = match state.service.resume_session(&id).await? {
        Some(session) => session,
        None => match req.customer_id {
            Some(customer_id) => ConversationSession::from_parts(id, customer_id, Vec::new()),
            None => {
                return Err(ParleyError::NotFound(format!(
                    "conversation {} (pass customer_id to start it)",
                    id
                ))
                .into())
            }
        },
    };

    let reply = state.service.handle_turn(session, &req.message).await?;
    Ok(Json(TurnResponse {
        session_id: reply.session.session_id,
        answer: reply.answer,
        tool_calls: reply.tool_observations,
        usage: reply.usage,
    }))
}

async fn finalize(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<ConversationDocument>> {
    let req: FinalizeRequest = if body.is_empty() {
        FinalizeRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ParleyError::InvalidInput(format!("invalid body: {}", e)))?
    };
    let agent_id = req.agent_id;
    Ok(Json(state.service.finalize(&id, agent_id).await?))
}

async fn summary(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<String>,
) -> ApiResult<Json<TextResponse>> {
    let text = state.service.summarize_prior(&customer_id).await?;
    Ok(Json(TextResponse { text }))
}

async fn reply(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<String>,
    Query(query): Query<ReplyQuery>,
) -> ApiResult<Json<TextResponse>> {
    let session = query.session.as_deref();
    let text = if query.simulate {
        state.service.simulate_reply(&customer_id, session).await?
    } else {
        state.service.suggest_reply(&customer_id, session).await?
    };
    Ok(Json(TextResponse { text }))
}

async fn post_agent_turn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<TurnRequest>,
) -> ApiResult<Json<AgentTurnResponse>> {
    let session = match state.service.resume_agent_session(&id).await? {
        Some(session) => session,
        None => match req.customer_id {
            Some(customer_id) => ConversationSession::from_parts(id, customer_id, Vec::new()),
            None => {
                return Err(ParleyError::NotFound(format!(
                    "agent session {} (pass customer_id to start it)",
                    id
                ))
                .into())
            }
        },
    };

    let reply = state.service.agent_turn(session, &req.message).await?;
    Ok(Json(AgentTurnResponse {
        session_id: reply.session.session_id,
        customer_reply: reply.customer_reply,
        suggested_reply: reply.suggested_reply,
    }))
}

async fn transcribe(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TranscribeQuery>,
    body: Bytes,
) -> ApiResult<Json<TextResponse>> {
    let transcriber = state
        .transcriber
        .as_ref()
        .ok_or_else(|| ParleyError::Unavailable("speech-to-text is not configured".to_string()))?;
    if body.is_empty() {
        return Err(ParleyError::InvalidInput("audio body is empty".to_string()).into());
    }

    let file_name = query.file_name.unwrap_or_else(|| "audio.webm".to_string());
    let text = transcriber.transcribe(body.to_vec(), &file_name).await?;
    Ok(Json(TextResponse { text }))
}

async fn speech(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SpeechRequest>,
) -> ApiResult<Response> {
    let speaker = state
        .speaker
        .as_ref()
        .ok_or_else(|| ParleyError::Unavailable("text-to-speech is not configured".to_string()))?;

    let text = strip_citations(&req.text);
    if text.is_empty() {
        return Err(ParleyError::InvalidInput("text is empty".to_string()).into());
    }

    let audio = speaker.synthesize(&text).await?;
    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Prompts;
    use crate::llm::testing::ScriptedModel;
    use crate::llm::CompletionResponse;
    use crate::store::MemoryStore;
    use crate::tools::ToolRegistry;
    use async_trait::async_trait;

    struct FakeSpeech;

    #[async_trait]
    impl SpeechToText for FakeSpeech {
        async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> crate::error::Result<String> {
            Ok(format!("{} bytes from {}", audio.len(), file_name))
        }
    }

    #[async_trait]
    impl TextToSpeech for FakeSpeech {
        async fn synthesize(&self, text: &str) -> crate::error::Result<Vec<u8>> {
            Ok(text.as_bytes().to_vec())
        }
    }

    async fn spawn(responses: Vec<CompletionResponse>, with_speech: bool) -> String {
        let settings = Settings::default();
        let prompts = Prompts::load(None, Some(&settings.prompts.variables)).unwrap();
        let store = Arc::new(MemoryStore::new());
        let service = SupportService::new(
            settings,
            prompts,
            Arc::new(ScriptedModel::new(responses)),
            ToolRegistry::new(),
            store.clone(),
            store,
        );
        let speech = Arc::new(FakeSpeech);
        let state = Arc::new(AppState {
            service,
            transcriber: with_speech.then(|| speech.clone() as Arc<dyn SpeechToText>),
            speaker: with_speech.then(|| speech as Arc<dyn TextToSpeech>),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_health() {
        let base = spawn(vec![], false).await;
        let body: serde_json::Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_session_turn_and_read_back() {
        let base = spawn(vec![CompletionResponse::text("Happy to help!")], false).await;
        let http = reqwest::Client::new();

        let created = http
            .post(format!("{}/sessions", base))
            .json(&serde_json::json!({"customer_id": "7"}))
            .send()
            .await
            .unwrap();
        assert_eq!(created.status(), 201);
        let session: ConversationSession = created.json().await.unwrap();

        let turn: serde_json::Value = http
            .post(format!("{}/sessions/{}/turns", base, session.session_id))
            .json(&serde_json::json!({"message": "Hi", "customer_id": "7"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(turn["answer"], "Happy to help!");
        assert_eq!(turn["session_id"], session.session_id.as_str());

        let doc: ConversationDocument = http
            .get(format!("{}/sessions/{}", base, session.session_id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(doc.subject_id, "7");
        assert_eq!(doc.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let base = spawn(vec![], false).await;
        let response = reqwest::get(format!("{}/sessions/nope", base)).await.unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn test_turn_without_customer_for_new_session_is_404() {
        let base = spawn(vec![], false).await;
        let response = reqwest::Client::new()
            .post(format!("{}/sessions/fresh/turns", base))
            .json(&serde_json::json!({"message": "Hi"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn test_empty_message_is_400() {
        let base = spawn(vec![], false).await;
        let response = reqwest::Client::new()
            .post(format!("{}/sessions/fresh/turns", base))
            .json(&serde_json::json!({"message": "   ", "customer_id": "7"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn test_agent_turn_then_finalize() {
        let base = spawn(
            vec![
                CompletionResponse::text("My grinder stopped working."),
                CompletionResponse::text("Have you cleaned the burrs?"),
                CompletionResponse::text(r#"{"topic": "support", "product": "grinder", "sentiment": "upset"}"#),
            ],
            false,
        )
        .await;
        let http = reqwest::Client::new();

        let turn: serde_json::Value = http
            .post(format!("{}/agent-sessions/live-1/turns", base))
            .json(&serde_json::json!({"message": "Hello, Contoso support here.", "customer_id": "7"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(turn["session_id"], "live-1");
        assert_eq!(turn["customer_reply"], "My grinder stopped working.");
        assert_eq!(turn["suggested_reply"], "Have you cleaned the burrs?");

        let doc: ConversationDocument = http
            .post(format!("{}/sessions/live-1/finalize", base))
            .json(&serde_json::json!({"agent_id": 3}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(doc.id, "human_live-1");
        assert_eq!(doc.messages[0].role, crate::chat::Role::Assistant);
        assert_eq!(doc.messages[1].content, "My grinder stopped working.");
        assert_eq!(doc.agent_id, Some(3));

        let response = http
            .post(format!("{}/sessions/live-1/turns", base))
            .json(&serde_json::json!({"message": "Hi"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn test_reply_without_agent_session() {
        let base = spawn(vec![CompletionResponse::text("Hello, how can I help today?")], false).await;
        let body: serde_json::Value = reqwest::get(format!("{}/customers/7/reply", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["text"], "Hello, how can I help today?");
    }

    #[tokio::test]
    async fn test_speech_endpoints() {
        let base = spawn(vec![], true).await;
        let http = reqwest::Client::new();

        let transcript: serde_json::Value = http
            .post(format!("{}/transcribe?file_name=clip.wav", base))
            .body(vec![1u8, 2, 3])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(transcript["text"], "3 bytes from clip.wav");

        let audio = http
            .post(format!("{}/speech", base))
            .json(&serde_json::json!({"text": "Your order shipped (source: tracking) today."}))
            .send()
            .await
            .unwrap();
        assert_eq!(audio.headers()[header::CONTENT_TYPE.as_str()], "audio/mpeg");
        assert_eq!(audio.text().await.unwrap(), "Your order shipped today.");
    }

    #[tokio::test]
    async fn test_speech_unconfigured_is_503() {
        let base = spawn(vec![], false).await;
        let response = reqwest::Client::new()
            .post(format!("{}/speech", base))
            .json(&serde_json::json!({"text": "hello"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 503);
    }
}
