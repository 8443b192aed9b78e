//! Verifier: independent second opinion on a classification.
//!
//! Purely advisory: the verdict lands in the audit trail and never changes
//! what the dispatcher does.

use std::sync::Arc;

use tracing::warn;

use crate::error::VerificationError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::{Decision, Verdict};

/// One word is expected, but the OpenAI Responses API rejects
/// `max_output_tokens` below 16.
const VERIFY_MAX_TOKENS: u32 = 16;

const VERIFY_TEMPERATURE: f32 = 0.0;

pub struct Verifier {
    llm: Arc<dyn LlmProvider>,
}

impl Verifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Ask the model whether `decision` is right for `email_text`.
    pub async fn verify(
        &self,
        email_text: &str,
        decision: &Decision,
    ) -> Result<Verdict, VerificationError> {
        let request = CompletionRequest::new(vec![ChatMessage::user(build_verify_prompt(
            email_text, decision,
        ))])
        .with_temperature(VERIFY_TEMPERATURE)
        .with_max_tokens(VERIFY_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        parse_verdict(&response.content)
    }

    /// Like `verify`, but any failure becomes `Verdict::Unknown`.
    pub async fn verify_or_unknown(&self, email_text: &str, decision: &Decision) -> Verdict {
        match self.verify(email_text, decision).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(error = %e, "Verification failed, recording verdict as unknown");
                Verdict::Unknown
            }
        }
    }
}

fn build_verify_prompt(email_text: &str, decision: &Decision) -> String {
    let serialized = serde_json::to_string(decision).unwrap_or_else(|_| {
        format!(
            "{{\"classification\": \"{}\"}}",
            decision.category.as_str()
        )
    });

    format!(
        "Evaluate this email classification.\n\n\
         Email:\n{email_text}\n\n\
         Decision:\n{serialized}\n\n\
         Respond with exactly one word:\n\
         good\n\
         or\n\
         incorrect"
    )
}

/// Accepts `good` / `incorrect`, ignoring case, whitespace, quotes and
/// trailing punctuation.
pub fn parse_verdict(raw: &str) -> Result<Verdict, VerificationError> {
    let normalized = raw
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '.' | '!' | '*'))
        .trim()
        .to_ascii_lowercase();

    match normalized.as_str() {
        "good" => Ok(Verdict::Good),
        "incorrect" => Ok(Verdict::Incorrect),
        _ => Err(VerificationError::UnrecognizedVerdict(raw.trim().to_string())),
    }
}
