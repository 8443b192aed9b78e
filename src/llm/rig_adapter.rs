//! Bridges rig-core's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::{CompletionError, CompletionModel};
use rig::message::{AssistantContent, Message};

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, ResponseSchema, Role,
};

/// How a backend accepts a response schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StructuredOutput {
    /// No native support; the schema is dropped and the prompt carries the format.
    #[default]
    PromptOnly,
    /// OpenAI Responses API `text.format` of type `json_schema`, strict.
    OpenAiResponses,
}

impl StructuredOutput {
    /// Provider-specific `additional_params` for `schema`.
    fn params(self, schema: &ResponseSchema) -> Option<serde_json::Value> {
        match self {
            Self::PromptOnly => None,
            Self::OpenAiResponses => Some(serde_json::json!({
                "text": {
                    "format": {
                        "type": "json_schema",
                        "name": schema.name,
                        "schema": schema.schema,
                        "strict": true,
                    }
                }
            })),
        }
    }
}

/// Adapter wrapping any rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
    provider: &'static str,
    structured_output: StructuredOutput,
}

impl<M> RigAdapter<M>
where
    M: CompletionModel,
{
    pub fn new(model: M, model_name: &str, provider: &'static str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            provider,
            structured_output: StructuredOutput::PromptOnly,
        }
    }

    pub fn with_structured_output(mut self, structured_output: StructuredOutput) -> Self {
        self.structured_output = structured_output;
        self
    }

    fn map_error(&self, err: CompletionError) -> LlmError {
        let reason = err.to_string();
        let lower = reason.to_lowercase();
        if lower.contains("429") || lower.contains("rate limit") {
            LlmError::RateLimited {
                provider: self.provider.to_string(),
                retry_after: None,
            }
        } else if lower.contains("401")
            || lower.contains("unauthorized")
            || lower.contains("invalid_api_key")
            || lower.contains("authentication_error")
        {
            LlmError::AuthFailed {
                provider: self.provider.to_string(),
            }
        } else {
            LlmError::RequestFailed {
                provider: self.provider.to_string(),
                reason,
            }
        }
    }
}

/// Split our message list into (preamble, history, prompt) as rig expects.
fn split_messages(messages: Vec<ChatMessage>) -> (Option<String>, Vec<Message>, Option<Message>) {
    let mut system = Vec::new();
    let mut history = Vec::new();

    for message in messages {
        match message.role {
            Role::System => system.push(message.content),
            Role::User => history.push(Message::user(message.content)),
            Role::Assistant => history.push(Message::assistant(message.content)),
        }
    }

    let prompt = history.pop();
    let preamble = if system.is_empty() {
        None
    } else {
        Some(system.join("\n\n"))
    };
    (preamble, history, prompt)
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (preamble, history, prompt) = split_messages(request.messages);
        let prompt = prompt.ok_or_else(|| LlmError::InvalidResponse {
            provider: self.provider.to_string(),
            reason: "request has no user message".into(),
        })?;

        let mut builder = self.model.completion_request(prompt).messages(history);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }
        if let Some(params) = request
            .response_schema
            .as_ref()
            .and_then(|schema| self.structured_output.params(schema))
        {
            builder = builder.additional_params(params);
        }

        let response = builder.send().await.map_err(|e| self.map_error(e))?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        tracing::debug!(
            model = %self.model_name,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "LLM completion finished"
        );

        Ok(CompletionResponse {
            content,
            input_tokens: u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX),
            output_tokens: u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX),
        })
    }
}
