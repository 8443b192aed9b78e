//! Per-message triage pipeline: fetch → classify → verify → act → record.
//!
//! A message that cannot be fetched or classified is skipped and left
//! unread, so the next cycle picks it up again. Once a valid decision
//! exists the message is always dispatched and always audited.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::audit::{AuditRecord, AuditStore};
use crate::error::{MailboxError, PipelineError};
use crate::llm::LlmProvider;
use crate::mailbox::Mailbox;
use crate::pipeline::classifier::Classifier;
use crate::pipeline::dispatcher::ActionDispatcher;
use crate::pipeline::types::ProcessedMessage;
use crate::pipeline::verifier::Verifier;

/// The triage pipeline. Collaborators are injected; their lifecycles belong
/// to the caller.
pub struct TriagePipeline {
    mailbox: Arc<dyn Mailbox>,
    classifier: Classifier,
    verifier: Verifier,
    dispatcher: ActionDispatcher,
    audit: Arc<dyn AuditStore>,
}

impl TriagePipeline {
    /// `classifier_llm` and `verifier_llm` may be the same provider.
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        classifier_llm: Arc<dyn LlmProvider>,
        verifier_llm: Arc<dyn LlmProvider>,
        audit: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            dispatcher: ActionDispatcher::new(Arc::clone(&mailbox)),
            mailbox,
            classifier: Classifier::new(classifier_llm),
            verifier: Verifier::new(verifier_llm),
            audit,
        }
    }

    /// Ids of up to `limit` unread messages.
    pub async fn list_unread(&self, limit: usize) -> Result<Vec<String>, MailboxError> {
        self.mailbox.list_unread(limit).await
    }

    /// Run one message through the full pipeline.
    pub async fn process(&self, id: &str) -> Result<ProcessedMessage, PipelineError> {
        let message = self
            .mailbox
            .get_message(id)
            .await
            .map_err(|source| PipelineError::Fetch {
                id: id.to_string(),
                source,
            })?;

        info!(
            id,
            mailbox = self.mailbox.name(),
            subject = %message.subject,
            sender = %message.sender,
            "Triaging message"
        );

        let email_text = message.email_text();

        let decision = self
            .classifier
            .classify(&email_text)
            .await
            .map_err(|source| PipelineError::Classification {
                id: id.to_string(),
                source,
            })?;

        let verdict = self.verifier.verify_or_unknown(&email_text, &decision).await;

        info!(
            id,
            category = %decision.category,
            verdict = %verdict,
            "Classification complete"
        );

        let dispatch = self.dispatcher.dispatch(&message, &decision).await;
        if !dispatch.marked_read() {
            warn!(id, "Message left unread, next cycle will triage it again");
        }

        let record = AuditRecord::new(message.subject.clone(), decision.category, verdict)
            .with_action_errors(dispatch.failures.iter().map(|f| f.to_string()).collect());

        let audited = match self.audit.append(record).await {
            Ok(()) => true,
            Err(e) => {
                error!(id, error = %e, "Failed to write audit record, queued for retry");
                false
            }
        };

        Ok(ProcessedMessage {
            id: message.id,
            subject: message.subject,
            decision,
            verdict,
            dispatch,
            audited,
        })
    }
}
