//! Prompt template loading and placeholder substitution.

use std::path::Path;

use crate::error::{GatewayError, Result};

pub const DOCUMENT_PLACEHOLDER: &str = "{{PDF_TEXT}}";
pub const RESUME_JSON_PLACEHOLDER: &str = "{{USER_RESUME_JSON}}";

/// One extraction prompt: a well-known type resolved to a template file,
/// optionally overridden by an inline prompt.
#[derive(Debug, Clone)]
pub struct PromptItem {
    pub prompt_type: String,
    pub prompt: Option<String>,
}

/// Template file backing each known prompt type.
fn template_file(prompt_type: &str) -> Option<&'static str> {
    match prompt_type {
        "contact" | "about" => Some("extract_prompt_contact_about.txt"),
        "education" | "certifications" => Some("extract_prompt_education_certifications.txt"),
        "experience" => Some("extract_prompt_experience.txt"),
        "projects" => Some("extract_prompt_projects.txt"),
        "skills" => Some("extract_prompt_skills.txt"),
        _ => None,
    }
}

pub fn load_prompt_template(prompts_dir: &str, prompt_type: &str) -> Result<String> {
    let filename = template_file(prompt_type).ok_or_else(|| {
        GatewayError::Validation(format!("unknown prompt type: {prompt_type}"))
    })?;
    let path = Path::new(prompts_dir).join(filename);
    std::fs::read_to_string(&path).map_err(|e| {
        GatewayError::Internal(format!("prompt file not found: {}: {e}", path.display()))
    })
}

/// Resolve the template (inline prompt wins over the type's file) and
/// substitute the document text.
pub fn build_prompt(prompts_dir: &str, document_text: &str, item: &PromptItem) -> Result<String> {
    let template = match &item.prompt {
        Some(prompt) if !prompt.is_empty() => prompt.clone(),
        _ => load_prompt_template(prompts_dir, &item.prompt_type)?,
    };
    Ok(template.replace(DOCUMENT_PLACEHOLDER, document_text))
}
