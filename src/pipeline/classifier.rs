//! Classifier: one structured-output LLM call per message.
//!
//! Requested at zero temperature so the same text maps to the same
//! category across runs. Output that does not parse into a known category
//! is an error; no default category is ever substituted.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ClassificationError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::{Category, Decision};

/// Max tokens for the classification call (reasoning + draft reply).
const CLASSIFY_MAX_TOKENS: u32 = 512;

/// Zero sampling temperature; category assignment must be reproducible.
const CLASSIFY_TEMPERATURE: f32 = 0.0;

/// Name of the structured-output schema sent with the request.
const DECISION_SCHEMA_NAME: &str = "triage_decision";

pub struct Classifier {
    llm: Arc<dyn LlmProvider>,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Classify raw email text into a `Decision`.
    pub async fn classify(&self, email_text: &str) -> Result<Decision, ClassificationError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_classify_system_prompt()),
            ChatMessage::user(build_classify_user_prompt(email_text)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS)
        .with_response_schema(DECISION_SCHEMA_NAME, decision_schema());

        let response = self.llm.complete(request).await?;

        let decision = parse_classification(&response.content).inspect_err(|e| {
            warn!(
                model = self.llm.model_name(),
                raw_response = %response.content,
                error = %e,
                "Unusable classifier output"
            );
        })?;

        debug!(
            category = %decision.category,
            reasoning = %decision.reasoning,
            "Classified message"
        );
        Ok(decision)
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_classify_system_prompt() -> String {
    let categories = Category::ALL
        .iter()
        .map(|c| format!("- {}", c.as_str()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an email triage classifier.\n\n\
         Classify the email into exactly one of:\n{categories}\n\n\
         Guidance:\n\
         - urgent: needs a prompt human response (outages, deadlines, escalations)\n\
         - follow_up: needs action or a reply, but not immediately\n\
         - informational: FYI, receipts, notifications, no action required\n\
         - marketing: promotions, newsletters, sales outreach\n\
         - ignore: noise that needs no label at all\n\n\
         Return JSON only, with exactly these keys:\n\
         {{\"classification\": \"\", \"reasoning\": \"\", \"reply\": \"\"}}\n\n\
         Write a short, polite \"reply\" only for urgent emails; leave it empty otherwise."
    )
}

fn build_classify_user_prompt(email_text: &str) -> String {
    format!("Email:\n{email_text}")
}

/// Strict JSON Schema for the three decision fields. Every key is required
/// and the category is an enum, as strict structured output demands.
fn decision_schema() -> serde_json::Value {
    let categories: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
    serde_json::json!({
        "type": "object",
        "properties": {
            "classification": { "type": "string", "enum": categories },
            "reasoning": { "type": "string" },
            "reply": { "type": "string" },
        },
        "required": ["classification", "reasoning", "reply"],
        "additionalProperties": false,
    })
}

// ── Response parsing ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ClassificationResponse {
    #[serde(alias = "category")]
    classification: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    reply: Option<String>,
}

/// Parse classifier output into a `Decision`.
pub fn parse_classification(raw: &str) -> Result<Decision, ClassificationError> {
    let json_str = extract_json_object(raw);
    let response: ClassificationResponse =
        serde_json::from_str(&json_str).map_err(|e| ClassificationError::Malformed {
            reason: format!("JSON parse error: {e}"),
        })?;

    let classification = response
        .classification
        .ok_or_else(|| ClassificationError::Malformed {
            reason: "missing 'classification' field".into(),
        })?;

    Ok(Decision {
        category: Category::parse(&classification)?,
        reasoning: response.reasoning.unwrap_or_default(),
        reply: response.reply.unwrap_or_default(),
    })
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
pub(crate) fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
