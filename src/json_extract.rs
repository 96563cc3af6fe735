//! Fallback parse for model output that is not clean JSON: locate the first
//! balanced `{...}` block, string- and escape-aware, and parse that.

use serde_json::Value;

use crate::error::{GatewayError, Result};

pub fn extract_first_json(text: &str) -> Result<Value> {
    let bytes = text.as_bytes();
    let start = text
        .find('{')
        .ok_or_else(|| GatewayError::MalformedOutput("no JSON object start '{' found".to_string()))?;

    let mut depth = 0usize;
    let mut in_str = false;
    let mut escaped = false;
    let mut end = None;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_str {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_str = false;
            }
            continue;
        }
        match b {
            b'"' => in_str = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(i + 1);
                    break;
                }
            }
            _ => {}
        }
    }

    let end = end.ok_or_else(|| {
        GatewayError::MalformedOutput(
            "unbalanced braces; could not find JSON object end '}'".to_string(),
        )
    })?;

    serde_json::from_str(&text[start..end])
        .map_err(|e| GatewayError::MalformedOutput(format!("extracted block is not valid JSON: {e}")))
}
