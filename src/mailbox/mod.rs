//! Mailbox collaborator: listing, fetching and mutating messages.
//!
//! The triage pipeline only sees the `Mailbox` trait. Authentication,
//! transport and token refresh belong to the implementation and the
//! process entry point.

pub mod gmail;
pub mod message;

pub use gmail::{GmailConfig, GmailMailbox};
pub use message::{Message, Reply};

use async_trait::async_trait;

use crate::error::MailboxError;

/// Provider-assigned label identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelId(pub String);

impl LabelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LabelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trait for mailbox backends: pure I/O, no triage logic.
///
/// Every mutating call reports failure distinctly from success; the
/// pipeline decides what a failure means.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Backend name (e.g. "gmail").
    fn name(&self) -> &str;

    /// Ids of up to `limit` unread messages. Empty means nothing to do.
    async fn list_unread(&self, limit: usize) -> Result<Vec<String>, MailboxError>;

    /// Fetch a message. `MailboxError::NotFound` when it vanished after listing.
    async fn get_message(&self, id: &str) -> Result<Message, MailboxError>;

    /// Resolve a label name to its id, creating the label if absent.
    ///
    /// Must never create two labels with the same name, including under
    /// concurrent calls.
    async fn ensure_label(&self, name: &str) -> Result<LabelId, MailboxError>;

    async fn add_label(&self, id: &str, label: &LabelId) -> Result<(), MailboxError>;

    async fn remove_label(&self, id: &str, label: &LabelId) -> Result<(), MailboxError>;

    /// Remove the message from the inbox view.
    async fn archive(&self, id: &str) -> Result<(), MailboxError>;

    /// Clear the unread marker.
    async fn mark_read(&self, id: &str) -> Result<(), MailboxError>;

    async fn send_reply(&self, reply: &Reply) -> Result<(), MailboxError>;
}
