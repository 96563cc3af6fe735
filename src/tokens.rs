//! Output-token budget heuristics.

pub const CHARS_PER_TOKEN: usize = 4;
pub const MIN_OUTPUT_TOKENS: u32 = 16;
pub const EXTRACT_TOKEN_MULTIPLIER: u32 = 8;
pub const CLASSIFY_DEFAULT_TOKENS: u32 = 128;

/// Kind of model operation a budget is being computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Extract,
    Classify,
}

/// Rough char-count estimate of input tokens, rounded up, never zero.
pub fn approx_tokens_from_chars(n_chars: usize) -> u32 {
    let tokens = (n_chars + CHARS_PER_TOKEN - 1) / CHARS_PER_TOKEN;
    tokens.max(1) as u32
}

/// Output-token budget for an operation. An explicit request value wins
/// (floored at the minimum); otherwise extraction scales with input size and
/// classification uses a small fixed budget.
pub fn max_output_tokens(input_tokens: u32, operation: Operation, provided: Option<u32>) -> u32 {
    if let Some(tokens) = provided {
        return tokens.max(MIN_OUTPUT_TOKENS);
    }
    match operation {
        Operation::Extract => (input_tokens.saturating_mul(EXTRACT_TOKEN_MULTIPLIER))
            .max(MIN_OUTPUT_TOKENS),
        Operation::Classify => CLASSIFY_DEFAULT_TOKENS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_estimate_rounds_up_and_never_hits_zero() {
        assert_eq!(approx_tokens_from_chars(0), 1);
        assert_eq!(approx_tokens_from_chars(1), 1);
        assert_eq!(approx_tokens_from_chars(4), 1);
        assert_eq!(approx_tokens_from_chars(5), 2);
        assert_eq!(approx_tokens_from_chars(4000), 1000);
    }

    #[test]
    fn explicit_budget_wins_but_is_floored() {
        assert_eq!(max_output_tokens(100, Operation::Extract, Some(500)), 500);
        assert_eq!(max_output_tokens(100, Operation::Extract, Some(4)), MIN_OUTPUT_TOKENS);
        assert_eq!(max_output_tokens(100, Operation::Classify, Some(64)), 64);
    }

    #[test]
    fn extraction_scales_with_input() {
        assert_eq!(max_output_tokens(100, Operation::Extract, None), 800);
        assert_eq!(max_output_tokens(1, Operation::Extract, None), MIN_OUTPUT_TOKENS);
    }

    #[test]
    fn classification_uses_fixed_default() {
        assert_eq!(
            max_output_tokens(10_000, Operation::Classify, None),
            CLASSIFY_DEFAULT_TOKENS
        );
    }
}
