//! Triage pipeline.
//!
//! Each unread message flows through:
//! 1. `Mailbox::get_message()`: fetch
//! 2. `Classifier::classify()`: category, reasoning, draft reply
//! 3. `Verifier::verify()`: advisory verdict
//! 4. `ActionDispatcher::dispatch()`: labels, reply, archive, mark read
//! 5. `AuditStore::append()`: durable record
//!
//! `Scheduler` wraps this in the poll loop.

pub mod classifier;
pub mod dispatcher;
pub mod processor;
pub mod scheduler;
pub mod types;
pub mod verifier;

pub use processor::TriagePipeline;
pub use scheduler::{CycleSummary, Scheduler};
pub use types::{Category, Decision, Verdict};
