//! Shared types for the triage pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ClassificationError;

// ── Category ────────────────────────────────────────────────────────

/// Triage outcome assigned to a message. Closed set; anything else the
/// classifier emits is a `ClassificationError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Urgent,
    FollowUp,
    Informational,
    Marketing,
    Ignore,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Self::Urgent,
        Self::FollowUp,
        Self::Informational,
        Self::Marketing,
        Self::Ignore,
    ];

    /// Wire name, as used in prompts and the audit store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::FollowUp => "follow_up",
            Self::Informational => "informational",
            Self::Marketing => "marketing",
            Self::Ignore => "ignore",
        }
    }

    /// Parse a classifier-emitted category. Case and surrounding whitespace
    /// are ignored; nothing else is.
    pub fn parse(raw: &str) -> Result<Self, ClassificationError> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| ClassificationError::UnknownCategory(raw.to_string()))
    }

    /// Mailbox label applied for this category, if any.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            Self::Urgent => Some(labels::URGENT),
            Self::FollowUp => Some(labels::FOLLOW_UP),
            Self::Informational => Some(labels::INFO),
            Self::Marketing => Some(labels::MARKETING),
            Self::Ignore => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed label vocabulary.
pub mod labels {
    pub const URGENT: &str = "AI-Urgent";
    pub const FOLLOW_UP: &str = "AI-FollowUp";
    pub const INFO: &str = "AI-Info";
    pub const MARKETING: &str = "AI-Marketing";
}

// ── Decision / Verdict ──────────────────────────────────────────────

/// Structured classifier output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    #[serde(rename = "classification")]
    pub category: Category,
    /// Free text, for logging only.
    pub reasoning: String,
    /// Draft reply. Only meaningful for `Category::Urgent`.
    pub reply: String,
}

/// Advisory signal from the verification pass. Never alters dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Good,
    Incorrect,
    /// Verification failed or returned something unrecognizable.
    Unknown,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Incorrect => "incorrect",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Dispatch report ─────────────────────────────────────────────────

/// A single mailbox side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ApplyLabel(&'static str),
    SendReply,
    Archive,
    MarkRead,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApplyLabel(name) => write!(f, "apply_label({name})"),
            Self::SendReply => f.write_str("send_reply"),
            Self::Archive => f.write_str("archive"),
            Self::MarkRead => f.write_str("mark_read"),
        }
    }
}

/// A side effect that was attempted and failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure {
    pub action: Action,
    pub error: String,
}

impl fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.action, self.error)
    }
}

/// What dispatch did for one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Side effects that succeeded, in execution order.
    pub completed: Vec<Action>,
    pub failures: Vec<ActionFailure>,
    /// Urgent message with an empty draft: no reply was attempted.
    pub reply_skipped: bool,
}

impl DispatchReport {
    pub fn marked_read(&self) -> bool {
        self.completed.contains(&Action::MarkRead)
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// ── Outcome ─────────────────────────────────────────────────────────

/// Result of running one message through the pipeline.
#[derive(Debug, Clone)]
pub struct ProcessedMessage {
    pub id: String,
    pub subject: String,
    pub decision: Decision,
    pub verdict: Verdict,
    pub dispatch: DispatchReport,
    /// Whether the audit record was committed in this cycle.
    pub audited: bool,
}
