//! Inbox triage: classify, verify, act on and audit unread mail.

pub mod audit;
pub mod config;
pub mod error;
pub mod llm;
pub mod mailbox;
pub mod pipeline;
