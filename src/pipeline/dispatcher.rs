//! Action dispatcher: deterministic category → mailbox side effects.
//!
//! | Category      | Side effects                               |
//! |---------------|--------------------------------------------|
//! | urgent        | label `AI-Urgent`, reply to sender         |
//! | follow_up     | label `AI-FollowUp`                        |
//! | informational | label `AI-Info`                            |
//! | marketing     | label `AI-Marketing`, archive              |
//! | ignore        | nothing                                    |
//!
//! Every message then has its unread marker cleared, exactly once, whatever
//! happened before. Individual failures are collected in the report rather
//! than aborting the bundle.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::MailboxError;
use crate::mailbox::{Mailbox, Message, Reply};
use crate::pipeline::types::{Action, ActionFailure, Category, Decision, DispatchReport};

/// Side effects for one category, before the unconditional mark-read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bundle {
    label: Option<&'static str>,
    reply: bool,
    archive: bool,
}

fn bundle_for(category: Category) -> Bundle {
    match category {
        Category::Urgent => Bundle {
            label: category.label(),
            reply: true,
            archive: false,
        },
        Category::Marketing => Bundle {
            label: category.label(),
            reply: false,
            archive: true,
        },
        Category::FollowUp | Category::Informational | Category::Ignore => Bundle {
            label: category.label(),
            reply: false,
            archive: false,
        },
    }
}

pub struct ActionDispatcher {
    mailbox: Arc<dyn Mailbox>,
}

impl ActionDispatcher {
    pub fn new(mailbox: Arc<dyn Mailbox>) -> Self {
        Self { mailbox }
    }

    /// Apply the category's side effects to `message`, then clear unread.
    pub async fn dispatch(&self, message: &Message, decision: &Decision) -> DispatchReport {
        let bundle = bundle_for(decision.category);
        let mut report = DispatchReport::default();

        if let Some(label) = bundle.label {
            let result = self.apply_label(&message.id, label).await;
            record(&mut report, &message.id, Action::ApplyLabel(label), result);
        }

        if bundle.reply {
            if decision.reply.trim().is_empty() {
                debug!(id = %message.id, "Urgent message has no draft reply, not sending");
                report.reply_skipped = true;
            } else {
                let result = self.send_reply(message, &decision.reply).await;
                record(&mut report, &message.id, Action::SendReply, result);
            }
        }

        if bundle.archive {
            let result = self.mailbox.archive(&message.id).await;
            record(&mut report, &message.id, Action::Archive, result);
        }

        let result = self.mailbox.mark_read(&message.id).await;
        record(&mut report, &message.id, Action::MarkRead, result);

        if report.is_clean() {
            info!(
                id = %message.id,
                category = %decision.category,
                actions = report.completed.len(),
                "Dispatched"
            );
        }
        report
    }

    async fn apply_label(&self, id: &str, name: &str) -> Result<(), MailboxError> {
        let label = self.mailbox.ensure_label(name).await?;
        self.mailbox.add_label(id, &label).await
    }

    async fn send_reply(&self, message: &Message, body: &str) -> Result<(), MailboxError> {
        if message.sender.is_empty() {
            return Err(MailboxError::InvalidMessage {
                id: message.id.clone(),
                reason: "no sender address to reply to".into(),
            });
        }
        self.mailbox
            .send_reply(&Reply::to_message(message, body))
            .await
    }
}

fn record(
    report: &mut DispatchReport,
    id: &str,
    action: Action,
    result: Result<(), MailboxError>,
) {
    match result {
        Ok(()) => report.completed.push(action),
        Err(e) => {
            warn!(id, action = %action, error = %e, "Side effect failed");
            report.failures.push(ActionFailure {
                action,
                error: e.to_string(),
            });
        }
    }
}
