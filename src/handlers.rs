use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::ai_action::{process_ai_action, ActionRequest};
use crate::classification::process_classification;
use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::extraction::{process_batch_extraction, process_single_extraction};
use crate::gateway::AiGateway;
use crate::health;
use crate::job_store::{ActiveJobCounter, InMemoryJobStore, JobStore};
use crate::prompts::PromptItem;
use crate::response::{JobResponse, JobResultResponse, JobStatusResponse};
use crate::validation::{
    bool_field, optional_field, optional_u32, parse_prompt_items, require_field, validate_upload,
};

/// Application state shared across handlers and spawned job pipelines.
pub struct AppState {
    pub config: Config,
    pub gateway: Arc<AiGateway>,
    pub store: Arc<InMemoryJobStore>,
    pub jobs: ActiveJobCounter,
}

pub type SharedState = Arc<AppState>;

/// Fields every job pipeline needs: who is asking, with which credential,
/// against which model.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub user_id: String,
    pub credential: String,
    pub model: String,
    pub max_output_tokens: Option<u32>,
    pub deterministic: bool,
}

impl JobContext {
    fn from_form(fields: &HashMap<String, String>, deterministic_default: bool) -> Result<Self> {
        Ok(Self {
            user_id: require_field(fields, "user_id")?,
            credential: require_field(fields, "openai_api_key")?,
            model: require_field(fields, "model")?,
            max_output_tokens: optional_u32(fields, "max_output_tokens")?,
            deterministic: bool_field(fields, "temperature_zero", deterministic_default)?,
        })
    }
}

/// Collected multipart form: text fields plus the optional file part.
struct UploadForm {
    fields: HashMap<String, String>,
    file: Option<Vec<u8>>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm> {
    let mut fields = HashMap::new();
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::Validation(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| GatewayError::Validation(format!("failed to read file: {e}")))?;
            file = Some(bytes.to_vec());
        } else if !name.is_empty() {
            let value = field
                .text()
                .await
                .map_err(|e| GatewayError::Validation(format!("failed to read '{name}': {e}")))?;
            fields.insert(name, value);
        }
    }

    Ok(UploadForm { fields, file })
}

fn require_upload(form: &UploadForm, max_size: usize) -> Result<Vec<u8>> {
    let file = form
        .file
        .as_ref()
        .ok_or_else(|| GatewayError::Validation("no file provided".to_string()))?;
    validate_upload(file, max_size)?;
    Ok(file.clone())
}

fn accepted(job_id: String, message: &str) -> impl IntoResponse {
    (
        StatusCode::ACCEPTED,
        Json(JobResponse::queued(job_id, message)),
    )
}

/// Queue a single-prompt extraction job.
pub async fn extract_single(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let form = read_form(multipart).await?;
    let file = require_upload(&form, state.config.max_file_size)?;
    let ctx = JobContext::from_form(&form.fields, false)?;
    let item = PromptItem {
        prompt_type: require_field(&form.fields, "prompt_type")?,
        prompt: optional_field(&form.fields, "prompt"),
    };

    let job_id = Uuid::new_v4().to_string();
    state.store.create(&job_id, &ctx.user_id, &ctx.credential).await;
    info!(job_id, user_id = %ctx.user_id, "queued single extraction");
    tokio::spawn(process_single_extraction(
        Arc::clone(&state),
        job_id.clone(),
        ctx,
        item,
        file,
    ));

    Ok(accepted(job_id, "extraction job queued; poll /jobs/{job_id}"))
}

/// Queue a batch extraction job: one model call per prompt item.
pub async fn extract_batch(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let form = read_form(multipart).await?;
    let file = require_upload(&form, state.config.max_file_size)?;
    let ctx = JobContext::from_form(&form.fields, false)?;
    let prompts = parse_prompt_items(&require_field(&form.fields, "prompts")?)?;

    let job_id = Uuid::new_v4().to_string();
    state.store.create(&job_id, &ctx.user_id, &ctx.credential).await;
    info!(job_id, user_id = %ctx.user_id, prompts = prompts.len(), "queued batch extraction");
    tokio::spawn(process_batch_extraction(
        Arc::clone(&state),
        job_id.clone(),
        ctx,
        prompts,
        file,
    ));

    Ok(accepted(job_id, "batch extraction job queued; poll /jobs/{job_id}"))
}

/// Queue a classification job.
pub async fn classify(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let form = read_form(multipart).await?;
    let file = require_upload(&form, state.config.max_file_size)?;
    // Classification defaults to deterministic decoding
    let ctx = JobContext::from_form(&form.fields, true)?;

    let job_id = Uuid::new_v4().to_string();
    state.store.create(&job_id, &ctx.user_id, &ctx.credential).await;
    info!(job_id, user_id = %ctx.user_id, "queued classification");
    tokio::spawn(process_classification(
        Arc::clone(&state),
        job_id.clone(),
        ctx,
        file,
    ));

    Ok(accepted(job_id, "classification job queued; poll /jobs/{job_id}"))
}

/// Queue an AI editing action. The file part is optional here.
pub async fn ai_action(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let form = read_form(multipart).await?;
    let file = match &form.file {
        Some(content) => {
            validate_upload(content, state.config.max_file_size)?;
            Some(content.clone())
        }
        None => None,
    };
    let ctx = JobContext::from_form(&form.fields, false)?;
    let action = ActionRequest {
        action_type: require_field(&form.fields, "action_type")?,
        tab: require_field(&form.fields, "tab")?,
        prompt: optional_field(&form.fields, "prompt"),
        resume_json: require_field(&form.fields, "resume_json")?,
    };

    let job_id = Uuid::new_v4().to_string();
    state.store.create(&job_id, &ctx.user_id, &ctx.credential).await;
    info!(job_id, user_id = %ctx.user_id, action_type = %action.action_type, "queued ai action");
    tokio::spawn(process_ai_action(
        Arc::clone(&state),
        job_id.clone(),
        ctx,
        action,
        file,
    ));

    Ok(accepted(job_id, "ai action job queued; poll /jobs/{job_id}"))
}

/// Poll job status.
pub async fn get_job_status(
    State(state): State<SharedState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse> {
    let job = state
        .store
        .get(&job_id)
        .await
        .ok_or(GatewayError::JobNotFound(job_id))?;
    Ok(Json(JobStatusResponse::from(&job)))
}

/// Fetch job result (or error text) once terminal.
pub async fn get_job_result(
    State(state): State<SharedState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse> {
    let job = state
        .store
        .get(&job_id)
        .await
        .ok_or(GatewayError::JobNotFound(job_id))?;
    Ok(Json(JobResultResponse::from(job)))
}

/// Health check endpoint.
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    Json(health::check(&state).await)
}
