//! Token counting with model-aware tokenizers.
//!
//! Prefers the tokenizer registered for the model name, falls back to
//! `cl100k_base`, and as a last resort estimates four characters per token.

use tiktoken_rs::CoreBPE;
use tracing::debug;

/// Token counter for one model.
pub enum TokenCounter {
    Exact(CoreBPE),
    /// `ceil(chars / 4)` estimate when no tokenizer is available.
    Estimate,
}

impl TokenCounter {
    /// Resolve the counter for a model name.
    #[must_use]
    pub fn for_model(model: &str) -> Self {
        if let Ok(bpe) = tiktoken_rs::get_bpe_from_model(model) {
            return Self::Exact(bpe);
        }
        match tiktoken_rs::cl100k_base() {
            Ok(bpe) => {
                debug!(model, "no model tokenizer, using cl100k_base");
                Self::Exact(bpe)
            }
            Err(_) => {
                debug!(model, "no tokenizer available, estimating tokens");
                Self::Estimate
            }
        }
    }

    #[must_use]
    pub fn count(&self, text: &str) -> usize {
        match self {
            Self::Exact(bpe) => bpe.encode_with_special_tokens(text).len(),
            Self::Estimate => text.chars().count().div_ceil(4),
        }
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(_) => f.write_str("TokenCounter::Exact"),
            Self::Estimate => f.write_str("TokenCounter::Estimate"),
        }
    }
}
