//! Document text extraction seam.
//!
//! Binary format parsing (PDF and friends) is an external collaborator; this
//! service accepts plain-text or pre-extracted documents and rejects anything
//! it cannot decode with a clear error.

use crate::error::{GatewayError, Result};

pub fn extract_document_text(content: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(content).map_err(|_| {
        GatewayError::Validation(
            "document is not valid UTF-8 text; upload plain-text or pre-extracted content"
                .to_string(),
        )
    })?;

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::Validation(
            "no extractable text found in document".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
