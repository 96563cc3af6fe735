//! Single and batch extraction job pipelines.

use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::document::extract_document_text;
use crate::handlers::{AppState, JobContext};
use crate::job_store::{JobStatus, JobStore};
use crate::openai::structured_result;
use crate::parallel::execute_parallel_extraction;
use crate::prompts::{build_prompt, PromptItem};
use crate::tokens::{approx_tokens_from_chars, max_output_tokens, Operation};

pub(crate) async fn fail_job(state: &AppState, job_id: &str, message: String) {
    state
        .store
        .update(job_id, JobStatus::Failed, None, None, Some(message))
        .await;
}

pub(crate) async fn complete_job(state: &AppState, job_id: &str, result: Value) {
    state
        .store
        .update(job_id, JobStatus::Completed, None, Some(result), None)
        .await;
}

pub async fn process_single_extraction(
    state: Arc<AppState>,
    job_id: String,
    ctx: JobContext,
    item: PromptItem,
    file: Vec<u8>,
) {
    state
        .store
        .update(&job_id, JobStatus::Processing, Some(10), None, None)
        .await;

    let _active = match state.jobs.try_begin(&ctx.user_id, &ctx.credential) {
        Ok(guard) => guard,
        Err(reason) => {
            fail_job(&state, &job_id, format!("Rate limit exceeded: {reason}")).await;
            return;
        }
    };

    let document_text = match extract_document_text(&file) {
        Ok(text) => text,
        Err(e) => {
            fail_job(&state, &job_id, e.to_string()).await;
            return;
        }
    };
    let input_tokens = approx_tokens_from_chars(document_text.len());
    state
        .store
        .update(&job_id, JobStatus::Processing, Some(40), None, None)
        .await;

    let budget = max_output_tokens(input_tokens, Operation::Extract, ctx.max_output_tokens);
    let prompt = match build_prompt(&state.config.prompts_dir, &document_text, &item) {
        Ok(prompt) => prompt,
        Err(e) => {
            fail_job(&state, &job_id, e.to_string()).await;
            return;
        }
    };

    let outcome = state
        .gateway
        .invoke(&ctx.credential, &ctx.model, &prompt, Some(budget), ctx.deterministic)
        .await
        .and_then(|response| structured_result(&response));

    match outcome {
        Ok(result) => {
            info!(job_id, "extraction completed");
            complete_job(&state, &job_id, result).await;
        }
        Err(e) => fail_job(&state, &job_id, e.to_string()).await,
    }
}

pub async fn process_batch_extraction(
    state: Arc<AppState>,
    job_id: String,
    ctx: JobContext,
    prompts: Vec<PromptItem>,
    file: Vec<u8>,
) {
    state
        .store
        .update(&job_id, JobStatus::Processing, Some(10), None, None)
        .await;

    let _active = match state.jobs.try_begin(&ctx.user_id, &ctx.credential) {
        Ok(guard) => guard,
        Err(reason) => {
            fail_job(&state, &job_id, format!("Rate limit exceeded: {reason}")).await;
            return;
        }
    };

    let document_text = match extract_document_text(&file) {
        Ok(text) => text,
        Err(e) => {
            fail_job(&state, &job_id, e.to_string()).await;
            return;
        }
    };
    let input_tokens = approx_tokens_from_chars(document_text.len());
    state
        .store
        .update(&job_id, JobStatus::Processing, Some(40), None, None)
        .await;

    let budget = max_output_tokens(input_tokens, Operation::Extract, ctx.max_output_tokens);
    let result = execute_parallel_extraction(
        Arc::clone(&state.gateway),
        state.config.prompts_dir.clone(),
        state.config.parallel_stagger(),
        document_text,
        prompts,
        ctx.credential.clone(),
        ctx.model.clone(),
        budget,
        ctx.deterministic,
    )
    .await;

    info!(job_id, "batch extraction completed");
    complete_job(&state, &job_id, result).await;
}
