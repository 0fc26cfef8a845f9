//! Model-driven extraction: prompt, call, parse.

pub mod dates;
pub mod llm;
mod patterns;
pub mod prompt;
pub mod response;
pub mod retry;

pub use dates::{DateValue, PRESENT, coerce_date};
pub use llm::{ChatClient, CompletionModel};
pub use prompt::{ExtractionRequest, PromptBuilder, TruncationNote};
pub use response::{ParseNote, ParsedResponse, locate_json_object, parse_response};
pub use retry::{Completion, RetryPolicy, complete_with_retry};

use std::sync::Arc;

use tracing::debug;

use crate::error::ExtractionError;

/// Outcome of a successful extraction.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub response: ParsedResponse,
    pub truncation: Option<TruncationNote>,
    /// Model calls made, including the successful one.
    pub attempts: u32,
}

/// Runs prompt construction, the bounded model call and reply parsing.
#[derive(Clone)]
pub struct Extractor {
    model: Arc<dyn CompletionModel>,
    prompts: PromptBuilder,
    policy: RetryPolicy,
}

impl Extractor {
    pub fn new(model: Arc<dyn CompletionModel>, prompts: PromptBuilder, policy: RetryPolicy) -> Self {
        Self {
            model,
            prompts,
            policy,
        }
    }

    /// Extract a parsed record from normalized document text.
    pub async fn extract(&self, text: &str) -> Result<Extraction, ExtractionError> {
        let request = self.prompts.build(text);
        let completion = complete_with_retry(self.model.as_ref(), &request, &self.policy).await?;

        debug!(
            "Model replied with {} chars after {} attempt(s)",
            completion.text.len(),
            completion.attempts
        );

        let response = parse_response(&completion.text)?;
        for note in &response.notes {
            debug!("Reply note: {}", note);
        }

        Ok(Extraction {
            response,
            truncation: request.truncation,
            attempts: completion.attempts,
        })
    }
}
