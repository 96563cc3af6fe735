use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::error::{GatewayError, Result};
use crate::gateway::ModelCaller;

/// Model-name prefixes known to accept an explicit temperature parameter.
/// Deterministic decoding is requested only for these.
const TEMPERATURE_MODEL_PREFIXES: &[&str] = &["gpt-4.1", "gpt-4o"];

pub fn model_supports_temperature(model: &str) -> bool {
    TEMPERATURE_MODEL_PREFIXES
        .iter()
        .any(|prefix| model.starts_with(prefix))
}

/// Normalized response from the model API.
///
/// Wraps the raw JSON payload and exposes the completion status plus the
/// output text located through the known response shapes.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    raw: Value,
}

impl ModelResponse {
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn status(&self) -> &str {
        self.raw.get("status").and_then(Value::as_str).unwrap_or("unknown")
    }

    pub fn is_complete(&self) -> bool {
        self.status() == "completed"
    }

    /// Vendor-supplied reason for an incomplete completion.
    pub fn incomplete_reason(&self) -> String {
        self.raw
            .get("incomplete_details")
            .and_then(|d| d.get("reason"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string()
    }

    /// Locate the output text via the known response shapes: a top-level
    /// `output_text` or `content` string, or nested `output[].content[]`
    /// blocks of type `output_text`/`text` whose text is a string or a
    /// `{value}` object.
    pub fn output_text(&self) -> Result<String> {
        if let Some(text) = self.raw.get("output_text").and_then(Value::as_str) {
            return Ok(text.to_string());
        }
        if let Some(text) = self.raw.get("content").and_then(Value::as_str) {
            return Ok(text.to_string());
        }

        for item in self
            .raw
            .get("output")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            if let Some(blocks) = item.get("content").and_then(Value::as_array) {
                for block in blocks {
                    let block_type = block.get("type").and_then(Value::as_str);
                    if !matches!(block_type, Some("output_text") | Some("text")) {
                        continue;
                    }
                    match block.get("text") {
                        Some(Value::String(text)) => return Ok(text.clone()),
                        Some(Value::Object(obj)) => {
                            if let Some(value) = obj.get("value") {
                                return Ok(value_to_text(value));
                            }
                        }
                        _ => {}
                    }
                }
            }
            match item.get("text") {
                Some(Value::String(text)) => return Ok(text.clone()),
                Some(Value::Object(obj)) => {
                    if let Some(value) = obj.get("value") {
                        return Ok(value_to_text(value));
                    }
                }
                _ => {}
            }
        }

        Err(GatewayError::NoOutputText)
    }
}

/// Reduce a completed response to its structured JSON payload: incomplete
/// completions fail with the vendor reason, and text that is not clean JSON
/// falls back to the first balanced object block.
pub fn structured_result(response: &ModelResponse) -> Result<Value> {
    if !response.is_complete() {
        return Err(GatewayError::Incomplete(response.incomplete_reason()));
    }
    let raw_text = response.output_text()?;
    let trimmed = raw_text.trim();
    match serde_json::from_str(trimmed) {
        Ok(value) => Ok(value),
        Err(_) => crate::json_extract::extract_first_json(trimmed),
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Low-level model caller: one synchronous request, no rate awareness.
/// Only the gateway façade is allowed to construct and invoke this.
#[derive(Debug, Clone)]
pub struct OpenAiCaller {
    http: Client,
    api_url: String,
}

impl OpenAiCaller {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_url: api_url.into(),
        })
    }

    fn build_payload(
        model: &str,
        prompt: &str,
        max_output_tokens: Option<u32>,
        deterministic: bool,
    ) -> Value {
        let mut payload = json!({
            "model": model,
            "input": prompt,
            "text": {"format": {"type": "json_object"}},
        });
        if let Some(tokens) = max_output_tokens {
            payload["max_output_tokens"] = json!(tokens);
        }
        if deterministic && model_supports_temperature(model) {
            payload["temperature"] = json!(0.0);
        }
        payload
    }
}

#[async_trait]
impl ModelCaller for OpenAiCaller {
    async fn call(
        &self,
        credential: &str,
        model: &str,
        prompt: &str,
        max_output_tokens: Option<u32>,
        deterministic: bool,
    ) -> Result<ModelResponse> {
        let payload = Self::build_payload(model, prompt, max_output_tokens, deterministic);
        debug!(model, prompt_len = prompt.len(), "sending model request");

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(credential)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream(format!(
                "model API error {}: {}",
                status.as_u16(),
                body
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Upstream(format!("invalid model API response: {e}")))?;
        Ok(ModelResponse::new(data))
    }
}
