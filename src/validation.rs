//! Validation of multipart form fields and uploads.

use serde::Deserialize;
use std::collections::HashMap;

use crate::error::{GatewayError, Result};
use crate::prompts::PromptItem;

pub fn require_field(fields: &HashMap<String, String>, name: &str) -> Result<String> {
    let value = fields
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GatewayError::Validation(format!("missing or empty '{name}' field")))?;
    Ok(value.to_string())
}

pub fn optional_field(fields: &HashMap<String, String>, name: &str) -> Option<String> {
    fields
        .get(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn optional_u32(fields: &HashMap<String, String>, name: &str) -> Result<Option<u32>> {
    match optional_field(fields, name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| GatewayError::Validation(format!("'{name}' must be a positive integer"))),
        None => Ok(None),
    }
}

pub fn bool_field(fields: &HashMap<String, String>, name: &str, default: bool) -> Result<bool> {
    match optional_field(fields, name) {
        Some(raw) => match raw.as_str() {
            "1" | "true" => Ok(true),
            "0" | "false" => Ok(false),
            _ => Err(GatewayError::Validation(format!(
                "'{name}' must be one of 1/0/true/false"
            ))),
        },
        None => Ok(default),
    }
}

pub fn validate_upload(content: &[u8], max_size: usize) -> Result<()> {
    if content.is_empty() {
        return Err(GatewayError::Validation("empty file".to_string()));
    }
    if content.len() > max_size {
        return Err(GatewayError::Validation(format!(
            "file too large; maximum size is {max_size} bytes"
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct PromptItemDto {
    prompt_type: String,
    #[serde(default)]
    prompt: Option<String>,
}

/// Parse the batch `prompts` field: a JSON array of
/// `{"prompt_type": ..., "prompt": ...}` objects.
pub fn parse_prompt_items(raw: &str) -> Result<Vec<PromptItem>> {
    let items: Vec<PromptItemDto> = serde_json::from_str(raw)
        .map_err(|e| GatewayError::Validation(format!("invalid 'prompts' field: {e}")))?;
    if items.is_empty() {
        return Err(GatewayError::Validation(
            "'prompts' must contain at least one item".to_string(),
        ));
    }
    Ok(items
        .into_iter()
        .map(|dto| PromptItem {
            prompt_type: dto.prompt_type,
            prompt: dto.prompt,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn missing_and_blank_fields_are_rejected() {
        let form = fields(&[("user_id", "   ")]);
        assert!(require_field(&form, "user_id").is_err());
        assert!(require_field(&form, "model").is_err());
        assert_eq!(
            require_field(&fields(&[("model", " gpt-4o ")]), "model").unwrap(),
            "gpt-4o"
        );
    }

    #[test]
    fn bool_field_accepts_both_spellings() {
        assert!(bool_field(&fields(&[("temperature_zero", "1")]), "temperature_zero", false).unwrap());
        assert!(bool_field(&fields(&[("temperature_zero", "true")]), "temperature_zero", false).unwrap());
        assert!(!bool_field(&fields(&[]), "temperature_zero", false).unwrap());
        assert!(bool_field(&fields(&[("temperature_zero", "yes")]), "temperature_zero", false).is_err());
    }

    #[test]
    fn upload_size_limits_are_enforced() {
        assert!(validate_upload(b"", 10).is_err());
        assert!(validate_upload(b"0123456789a", 10).is_err());
        assert!(validate_upload(b"0123456789", 10).is_ok());
    }

    #[test]
    fn prompt_items_parse_with_optional_inline_prompt() {
        let items = parse_prompt_items(
            r#"[{"prompt_type": "contact"}, {"prompt_type": "skills", "prompt": "list {{PDF_TEXT}}"}]"#,
        )
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].prompt_type, "contact");
        assert!(items[0].prompt.is_none());
        assert_eq!(items[1].prompt.as_deref(), Some("list {{PDF_TEXT}}"));
    }

    #[test]
    fn empty_prompt_list_is_rejected() {
        assert!(parse_prompt_items("[]").is_err());
        assert!(parse_prompt_items("not json").is_err());
    }
}
