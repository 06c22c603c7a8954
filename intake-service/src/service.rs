use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn,
    response::Json,
    routing::{get, post},
};
use intake_flow::{
    CATALOG_VERSION, ChatMessage, ConversationStateSnapshot, InMemorySessionStore, IntakeError,
    IntakeRunner, MessageRole, SessionStore, Stage, StaticCatalog,
};
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::{
    config::ServiceConfig,
    extractor::LlmExtractor,
    literature::{LiteratureProvider, NoLiterature, PassageLibrary},
    llm::llm_client,
    models::{
        CommitResponse, ImageFindingsRequest, MessageRequest, MessageResponse, WelcomeRequest,
        WelcomeResponse,
    },
    prompts,
    reply::{ReplyGenerator, RigReplyGenerator},
    telemetry::correlation_id_middleware,
};

pub const CLEARED_NOTICE: &str = "История диалога очищена.";
pub const IMAGE_FINDINGS_NOTE: &str = "Анализ изображения выявил следующие проблемы:";

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "user_id": id
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn intake_error(e: IntakeError, user_id: &str) -> ApiError {
    match e {
        IntakeError::SessionNotFound(_) => not_found_error("Session not found", user_id),
        other => {
            error!(user_id = %user_id, error = %other, "Intake operation failed");
            internal_error("Intake operation failed", &other.to_string())
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub runner: IntakeRunner,
    pub replies: Arc<dyn ReplyGenerator>,
    pub literature: Arc<dyn LiteratureProvider>,
}

pub async fn create_app(config: &ServiceConfig) -> anyhow::Result<Router> {
    let app_state = create_app_state(config).await?;
    if let Some(ttl) = config.session_idle_ttl {
        spawn_session_sweeper(
            app_state.runner.store().clone(),
            ttl,
            config.session_sweep_interval,
        );
    }
    Ok(build_router(app_state))
}

async fn create_app_state(config: &ServiceConfig) -> anyhow::Result<AppState> {
    let client = llm_client(&config.api_key);
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let extractor = Arc::new(LlmExtractor::new(
        client.clone(),
        &config.model,
        config.extraction_timeout,
    ));
    let runner = IntakeRunner::new(store, extractor, Arc::new(StaticCatalog::russian()));

    let literature: Arc<dyn LiteratureProvider> = match &config.literature_path {
        Some(path) => Arc::new(PassageLibrary::load(path, config.literature_top_k).await?),
        None => {
            info!("LITERATURE_PATH not set, diagnosis prompts get no literature context");
            Arc::new(NoLiterature)
        }
    };

    Ok(AppState {
        runner,
        replies: Arc::new(RigReplyGenerator::new(client, &config.model)),
        literature,
    })
}

/// Periodically drop sessions idle for longer than `ttl`
pub fn spawn_session_sweeper(
    store: Arc<dyn SessionStore>,
    ttl: Duration,
    every: Duration,
) -> JoinHandle<()> {
    info!(ttl_secs = ttl.as_secs(), every_secs = every.as_secs(), "Starting idle session sweeper");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = store.evict_idle(ttl).await {
                error!(error = %e, "Idle session sweep failed");
            }
        }
    })
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/intake/message", post(process_message))
        .route("/intake/image-findings", post(process_image_findings))
        .route("/intake/welcome", post(welcome))
        .route("/intake/{user_id}/state", get(get_state))
        .route("/intake/{user_id}/commit", post(commit_stage))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(correlation_id_middleware))
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Medical Intake Service",
        "version": "1.0.0",
        "description": "Multi-turn medical intake: symptoms, patient background, preliminary diagnosis",
        "endpoints": {
            "POST /intake/message": "Process one user message and generate the assistant reply",
            "POST /intake/image-findings": "Merge symptoms found in an image, then process the message",
            "POST /intake/welcome": "Start or clear a conversation and get the greeting",
            "GET /intake/{user_id}/state": "Get the conversation state",
            "POST /intake/{user_id}/commit": "Apply the pending stage transition",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "catalog_version": CATALOG_VERSION,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

fn validate_user_id(user_id: &str) -> Result<&str, ApiError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(bad_request_error("Missing user_id"));
    }
    Ok(user_id)
}

/// The last user message and the history before it
fn split_prompt(prompt: &[ChatMessage]) -> Option<(&str, &[ChatMessage])> {
    let index = prompt
        .iter()
        .rposition(|message| message.role == MessageRole::User)?;
    Some((prompt[index].content.as_str(), &prompt[..index]))
}

async fn commit(state: &AppState, user_id: &str) -> Result<(), ApiError> {
    state
        .runner
        .commit(user_id)
        .await
        .map(|_| ())
        .map_err(|e| intake_error(e, user_id))
}

async fn literature_prompt(
    state: &AppState,
    prompt: String,
    snapshot: &ConversationStateSnapshot,
    message: &str,
) -> String {
    let query = format!("{} {}", snapshot.symptoms.join(" "), message);
    match state.literature.get_context(&query).await {
        Ok(context) => prompts::with_literature(prompt, &context),
        Err(e) => {
            warn!(error = %e, "Literature lookup failed, answering without it");
            prompt
        }
    }
}

async fn process_message(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> ApiResult<MessageResponse> {
    let user_id = validate_user_id(&request.user_id)?;
    let (message, history) =
        split_prompt(&request.prompt).ok_or_else(|| bad_request_error("Missing user message"))?;

    info!(
        user_id = %user_id,
        history_len = history.len(),
        is_start_dialog = request.is_start_dialog,
        "Processing intake message"
    );

    run_turn(&state, user_id, message, history, request.is_start_dialog)
        .await
        .map(Json)
}

async fn process_image_findings(
    State(state): State<AppState>,
    Json(request): Json<ImageFindingsRequest>,
) -> ApiResult<MessageResponse> {
    let user_id = validate_user_id(&request.user_id)?;
    let (message, history) =
        split_prompt(&request.prompt).ok_or_else(|| bad_request_error("Missing user message"))?;
    let symptoms: Vec<String> = request
        .symptoms
        .iter()
        .map(|symptom| symptom.trim().to_string())
        .filter(|symptom| !symptom.is_empty())
        .collect();

    info!(user_id = %user_id, symptoms = ?symptoms, "Processing image findings");

    let merged = state
        .runner
        .add_symptoms(user_id, &symptoms, request.is_start_dialog)
        .await
        .map_err(|e| intake_error(e, user_id))?;

    let mut history = history.to_vec();
    if !symptoms.is_empty() {
        history.push(ChatMessage::system(format!(
            "{IMAGE_FINDINGS_NOTE} {}",
            symptoms.join(", ")
        )));
    }

    let mut response = run_turn(&state, user_id, message, &history, false).await?;
    if !merged.start_messages.is_empty() {
        response.messages.splice(0..0, merged.start_messages);
    }
    Ok(Json(response))
}

/// Process, answer, then commit one turn
async fn run_turn(
    state: &AppState,
    user_id: &str,
    message: &str,
    history: &[ChatMessage],
    is_new_session: bool,
) -> Result<MessageResponse, ApiError> {
    let outcome = state
        .runner
        .process(user_id, message, history, is_new_session)
        .await
        .map_err(|e| intake_error(e, user_id))?;

    if outcome.plan.has_error() {
        error!(user_id = %user_id, "Conversation turn failed, stage not advanced");
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Error processing message" })),
        ));
    }

    let messages = outcome.messages();
    let plan = outcome.plan;
    let entering_diagnosis = plan.is_transition() && plan.to == Stage::Diagnosis;

    // the diagnosis is answered in the same turn the last patient fact arrives
    let conversation_state = if entering_diagnosis {
        state
            .runner
            .apply(user_id, plan)
            .await
            .map_err(|e| intake_error(e, user_id))?;
        state
            .runner
            .get_snapshot(user_id)
            .await
            .map_err(|e| intake_error(e, user_id))?
    } else {
        plan.snapshot
    };

    let mut system_prompt = prompts::system_prompt(&conversation_state);
    if conversation_state.current_stage == Stage::Diagnosis {
        system_prompt = literature_prompt(state, system_prompt, &conversation_state, message).await;
    }

    let response = state
        .replies
        .generate(&system_prompt, history, message)
        .await
        .map_err(|e| {
            error!(user_id = %user_id, error = %e, "Failed to generate reply");
            internal_error("Failed to generate reply", &e.to_string())
        })?;

    if !entering_diagnosis {
        commit(state, user_id).await?;
    }

    Ok(MessageResponse {
        response,
        messages,
        conversation_state,
    })
}

async fn welcome(
    State(state): State<AppState>,
    Json(request): Json<WelcomeRequest>,
) -> ApiResult<WelcomeResponse> {
    let user_id = validate_user_id(&request.user_id)?;
    info!(user_id = %user_id, is_clear_command = request.is_clear_command, "Sending welcome messages");

    let greeting = state
        .runner
        .reset(user_id)
        .await
        .map_err(|e| intake_error(e, user_id))?;

    let mut messages = Vec::with_capacity(greeting.len() + 1);
    if request.is_clear_command {
        messages.push(CLEARED_NOTICE.to_string());
    }
    messages.extend(greeting);

    let conversation_state = state
        .runner
        .get_snapshot(user_id)
        .await
        .map_err(|e| intake_error(e, user_id))?;

    Ok(Json(WelcomeResponse {
        messages,
        conversation_state,
    }))
}

async fn get_state(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<ConversationStateSnapshot> {
    info!(user_id = %user_id, "Getting conversation state");
    state
        .runner
        .get_snapshot(&user_id)
        .await
        .map(Json)
        .map_err(|e| intake_error(e, &user_id))
}

async fn commit_stage(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<CommitResponse> {
    let change = state
        .runner
        .commit(&user_id)
        .await
        .map_err(|e| intake_error(e, &user_id))?;
    let conversation_state = state
        .runner
        .get_snapshot(&user_id)
        .await
        .map_err(|e| intake_error(e, &user_id))?;

    Ok(Json(CommitResponse {
        changed: change.is_some(),
        from: change.map(|change| change.from),
        to: change.map(|change| change.to),
        conversation_state,
    }))
}
