//! End-to-end pipeline tests against in-memory mailbox and LLM mocks.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use inbox_triage::audit::{AuditStore, JsonFileAuditLog};
use inbox_triage::error::{LlmError, MailboxError};
use inbox_triage::llm::{CompletionRequest, CompletionResponse, LlmProvider};
use inbox_triage::mailbox::message::MAX_EMAIL_TEXT_CHARS;
use inbox_triage::mailbox::{LabelId, Mailbox, Message, Reply};
use inbox_triage::pipeline::types::Action;
use inbox_triage::pipeline::{Category, Scheduler, TriagePipeline, Verdict};

// ── Mock mailbox ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    AddLabel(String, String),
    Archive(String),
    MarkRead(String),
    SendReply(Reply),
}

#[derive(Default)]
struct MockMailbox {
    messages: Mutex<HashMap<String, Message>>,
    /// Unread ids in arrival order.
    unread: Mutex<Vec<String>>,
    /// Ids listed as unread but deleted before fetch.
    vanished: Mutex<HashSet<String>>,
    inbox: Mutex<HashSet<String>>,
    labels: Mutex<HashMap<String, LabelId>>,
    label_creations: AtomicUsize,
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<&'static str>>,
    fetches: AtomicUsize,
    cancel_on_fetch: Mutex<Option<CancellationToken>>,
}

impl MockMailbox {
    fn deliver(&self, id: &str, subject: &str, sender: &str, body: &str) {
        self.messages.lock().unwrap().insert(
            id.to_string(),
            Message {
                id: id.to_string(),
                subject: subject.to_string(),
                sender: sender.to_string(),
                body: body.to_string(),
                message_id: Some(format!("{id}@mail.example")),
            },
        );
        self.unread.lock().unwrap().push(id.to_string());
        self.inbox.lock().unwrap().insert(id.to_string());
    }

    fn deliver_vanished(&self, id: &str) {
        self.unread.lock().unwrap().push(id.to_string());
        self.vanished.lock().unwrap().insert(id.to_string());
    }

    fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    fn recover(&self, operation: &'static str) {
        self.failing.lock().unwrap().remove(operation);
    }

    fn check(&self, operation: &'static str) -> Result<(), MailboxError> {
        if self.failing.lock().unwrap().contains(operation) {
            return Err(MailboxError::Transient {
                operation: operation.to_string(),
                reason: "simulated outage".into(),
            });
        }
        Ok(())
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn is_unread(&self, id: &str) -> bool {
        self.unread.lock().unwrap().iter().any(|u| u == id)
    }

    fn in_inbox(&self, id: &str) -> bool {
        self.inbox.lock().unwrap().contains(id)
    }

    fn mark_read_count(&self, id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::MarkRead(m) if m == id))
            .count()
    }

    fn labels_on(&self, id: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::AddLabel(m, label) if m == id => Some(label),
                _ => None,
            })
            .collect()
    }

    fn replies(&self) -> Vec<Reply> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SendReply(r) => Some(r),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Mailbox for MockMailbox {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_unread(&self, limit: usize) -> Result<Vec<String>, MailboxError> {
        self.check("list_unread")?;
        Ok(self.unread.lock().unwrap().iter().take(limit).cloned().collect())
    }

    async fn get_message(&self, id: &str) -> Result<Message, MailboxError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = self.cancel_on_fetch.lock().unwrap().as_ref() {
            token.cancel();
        }
        self.check("get_message")?;
        if self.vanished.lock().unwrap().contains(id) {
            return Err(MailboxError::NotFound { id: id.to_string() });
        }
        self.messages
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| MailboxError::NotFound { id: id.to_string() })
    }

    async fn ensure_label(&self, name: &str) -> Result<LabelId, MailboxError> {
        self.check("ensure_label")?;
        let mut labels = self.labels.lock().unwrap();
        if let Some(id) = labels.get(name) {
            return Ok(id.clone());
        }
        let n = self.label_creations.fetch_add(1, Ordering::SeqCst);
        let id = LabelId(format!("Label_{n}"));
        labels.insert(name.to_string(), id.clone());
        Ok(id)
    }

    async fn add_label(&self, id: &str, label: &LabelId) -> Result<(), MailboxError> {
        self.check("add_label")?;
        let name = self
            .labels
            .lock()
            .unwrap()
            .iter()
            .find(|(_, v)| *v == label)
            .map(|(k, _)| k.clone())
            .unwrap_or_else(|| label.to_string());
        self.calls
            .lock()
            .unwrap()
            .push(Call::AddLabel(id.to_string(), name));
        Ok(())
    }

    async fn remove_label(&self, _id: &str, _label: &LabelId) -> Result<(), MailboxError> {
        self.check("remove_label")
    }

    async fn archive(&self, id: &str) -> Result<(), MailboxError> {
        self.check("archive")?;
        self.inbox.lock().unwrap().remove(id);
        self.calls.lock().unwrap().push(Call::Archive(id.to_string()));
        Ok(())
    }

    async fn mark_read(&self, id: &str) -> Result<(), MailboxError> {
        self.check("mark_read")?;
        self.unread.lock().unwrap().retain(|u| u != id);
        self.calls.lock().unwrap().push(Call::MarkRead(id.to_string()));
        Ok(())
    }

    async fn send_reply(&self, reply: &Reply) -> Result<(), MailboxError> {
        self.check("send_reply")?;
        self.calls.lock().unwrap().push(Call::SendReply(reply.clone()));
        Ok(())
    }
}

// ── Mock LLMs ───────────────────────────────────────────────────────

/// Returns the response whose needle appears in the last message.
struct ScriptedLlm {
    script: Vec<(&'static str, String)>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn new(script: Vec<(&'static str, &str)>) -> Arc<Self> {
        Arc::new(Self {
            script: script
                .into_iter()
                .map(|(needle, response)| (needle, response.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt.clone());
        let content = self
            .script
            .iter()
            .find(|(needle, _)| prompt.contains(needle))
            .map(|(_, response)| response.clone())
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: "scripted".into(),
                reason: "no scripted response".into(),
            })?;
        Ok(CompletionResponse {
            content,
            input_tokens: 10,
            output_tokens: 10,
        })
    }
}

struct DownLlm;

#[async_trait]
impl LlmProvider for DownLlm {
    fn model_name(&self) -> &str {
        "down"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Err(LlmError::RequestFailed {
            provider: "down".into(),
            reason: "connection refused".into(),
        })
    }
}

fn classification(category: &str, reply: &str) -> String {
    serde_json::json!({
        "classification": category,
        "reasoning": format!("looks {category}"),
        "reply": reply,
    })
    .to_string()
}

fn standard_classifier() -> Arc<ScriptedLlm> {
    ScriptedLlm::new(vec![
        ("Server down", &classification("urgent", "Investigating now.")),
        ("Pager silent", &classification("urgent", "")),
        ("Disk alarm", &classification("urgent", "   \n")),
        ("Anonymous outage", &classification("urgent", "On it.")),
        ("Huge attachment", &classification("informational", "")),
        ("Lunch next week", &classification("follow_up", "")),
        ("Your receipt", &classification("informational", "")),
        ("50% off", &classification("marketing", "")),
        ("Automated digest", &classification("ignore", "")),
        ("Weird one", r#"{"classification": "spam", "reasoning": "", "reply": ""}"#),
        ("Header only", &classification("informational", "")),
    ])
}

fn always_good() -> Arc<ScriptedLlm> {
    ScriptedLlm::new(vec![("Decision:", "good")])
}

struct Harness {
    mailbox: Arc<MockMailbox>,
    audit: Arc<JsonFileAuditLog>,
    scheduler: Scheduler,
    _dir: tempfile::TempDir,
}

fn harness_with(classifier: Arc<dyn LlmProvider>, verifier: Arc<dyn LlmProvider>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mailbox = Arc::new(MockMailbox::default());
    let audit = Arc::new(JsonFileAuditLog::new(dir.path().join("memory.json")));
    let pipeline = TriagePipeline::new(
        mailbox.clone(),
        classifier,
        verifier,
        audit.clone() as Arc<dyn AuditStore>,
    );
    let scheduler = Scheduler::new(Arc::new(pipeline), Duration::from_millis(10), 5);
    Harness {
        mailbox,
        audit,
        scheduler,
        _dir: dir,
    }
}

fn harness() -> Harness {
    harness_with(standard_classifier(), always_good())
}

// ── Category behavior ───────────────────────────────────────────────

#[tokio::test]
async fn urgent_message_is_labeled_replied_read_and_audited() {
    let h = harness();
    h.mailbox.deliver(
        "m1",
        "Server down",
        "oncall@example.com",
        "prod is down, please help",
    );

    let summary = h.scheduler.run_cycle(&CancellationToken::new()).await;
    assert_eq!(summary.processed, 1);

    assert_eq!(h.mailbox.labels_on("m1"), vec!["AI-Urgent"]);
    let replies = h.mailbox.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].to, "oncall@example.com");
    assert_eq!(replies[0].body, "Investigating now.");
    assert_eq!(replies[0].subject, "Re: Server down");
    assert!(!h.mailbox.is_unread("m1"));
    assert_eq!(h.mailbox.mark_read_count("m1"), 1);

    let records = h.audit.load().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].subject, "Server down");
    assert_eq!(records[0].classification, Category::Urgent);
    assert_eq!(records[0].critique, Verdict::Good);
    assert!(records[0].action_errors.is_empty());
}

#[tokio::test]
async fn urgent_without_draft_skips_reply_but_labels() {
    let h = harness();
    h.mailbox
        .deliver("m1", "Pager silent", "ops@example.com", "no alerts since 3am");

    h.scheduler.run_cycle(&CancellationToken::new()).await;

    assert!(h.mailbox.replies().is_empty());
    assert_eq!(h.mailbox.labels_on("m1"), vec!["AI-Urgent"]);
    assert_eq!(h.mailbox.mark_read_count("m1"), 1);
}

#[tokio::test]
async fn blank_draft_counts_as_no_reply() {
    let dir = tempfile::tempdir().unwrap();
    let mailbox = Arc::new(MockMailbox::default());
    let audit = Arc::new(JsonFileAuditLog::new(dir.path().join("memory.json")));
    let pipeline = TriagePipeline::new(mailbox.clone(), standard_classifier(), always_good(), audit);
    mailbox.deliver("m1", "Disk alarm", "ops@example.com", "disk at 95%");

    let processed = pipeline.process("m1").await.unwrap();

    assert!(processed.dispatch.reply_skipped);
    assert!(processed.dispatch.is_clean());
    assert!(mailbox.replies().is_empty());
    assert_eq!(mailbox.labels_on("m1"), vec!["AI-Urgent"]);
    assert_eq!(
        processed.dispatch.completed,
        vec![Action::ApplyLabel("AI-Urgent"), Action::MarkRead]
    );
}

#[tokio::test]
async fn urgent_from_unknown_sender_records_reply_failure() {
    let h = harness();
    h.mailbox.deliver("m1", "Anonymous outage", "", "everything is broken");

    let summary = h.scheduler.run_cycle(&CancellationToken::new()).await;

    assert_eq!(summary.processed, 1);
    assert!(h.mailbox.replies().is_empty());
    assert_eq!(h.mailbox.labels_on("m1"), vec!["AI-Urgent"]);
    assert!(!h.mailbox.is_unread("m1"));

    let records = h.audit.load().await.unwrap();
    assert_eq!(records[0].action_errors.len(), 1);
    assert!(records[0].action_errors[0].starts_with("send_reply"));
}

#[tokio::test]
async fn classifier_and_verifier_see_the_same_capped_text() {
    let dir = tempfile::tempdir().unwrap();
    let mailbox = Arc::new(MockMailbox::default());
    let audit = Arc::new(JsonFileAuditLog::new(dir.path().join("memory.json")));
    let classifier = standard_classifier();
    let verifier = always_good();
    let pipeline = TriagePipeline::new(mailbox.clone(), classifier.clone(), verifier.clone(), audit);
    let body = "lorem ipsum ".repeat(MAX_EMAIL_TEXT_CHARS);
    mailbox.deliver("m1", "Huge attachment", "a@example.com", &body);
    let body_len = body.len();

    let processed = pipeline.process("m1").await.unwrap();
    assert_eq!(processed.verdict, Verdict::Good);

    let expected = Message {
        id: "m1".into(),
        subject: "Huge attachment".into(),
        sender: "a@example.com".into(),
        body,
        message_id: None,
    }
    .email_text();
    assert_eq!(expected.chars().count(), MAX_EMAIL_TEXT_CHARS);

    let classify_prompt = classifier.prompts.lock().unwrap()[0].clone();
    let verify_prompt = verifier.prompts.lock().unwrap()[0].clone();
    assert!(classify_prompt.contains(&expected));
    assert!(verify_prompt.contains(&expected));
    assert!(classify_prompt.len() < body_len);
    assert!(verify_prompt.len() < body_len);
}

#[tokio::test]
async fn marketing_is_labeled_and_archived() {
    let h = harness();
    h.mailbox
        .deliver("m1", "50% off everything", "deals@shop.example", "today only");

    h.scheduler.run_cycle(&CancellationToken::new()).await;

    assert_eq!(h.mailbox.labels_on("m1"), vec!["AI-Marketing"]);
    assert!(h.mailbox.calls().contains(&Call::Archive("m1".into())));
    assert!(!h.mailbox.in_inbox("m1"));
    assert!(!h.mailbox.is_unread("m1"));
}

#[tokio::test]
async fn ignore_gets_no_label_and_no_archive() {
    let h = harness();
    h.mailbox
        .deliver("m1", "Automated digest", "robot@example.com", "nothing new");

    h.scheduler.run_cycle(&CancellationToken::new()).await;

    let calls = h.mailbox.calls();
    assert_eq!(calls, vec![Call::MarkRead("m1".into())]);
    assert!(h.mailbox.in_inbox("m1"));

    let records = h.audit.load().await.unwrap();
    assert_eq!(records[0].classification, Category::Ignore);
}

#[tokio::test]
async fn every_category_clears_unread_exactly_once() {
    let h = harness();
    h.mailbox.deliver("m1", "Server down", "a@example.com", "help");
    h.mailbox.deliver("m2", "Lunch next week?", "b@example.com", "");
    h.mailbox.deliver("m3", "Your receipt", "c@example.com", "$12");
    h.mailbox.deliver("m4", "50% off", "d@example.com", "sale");
    h.mailbox.deliver("m5", "Automated digest", "e@example.com", "");

    let summary = h.scheduler.run_cycle(&CancellationToken::new()).await;
    assert_eq!(summary.listed, 5);
    assert_eq!(summary.processed, 5);

    for id in ["m1", "m2", "m3", "m4", "m5"] {
        assert_eq!(h.mailbox.mark_read_count(id), 1, "{id}");
        assert!(!h.mailbox.is_unread(id), "{id}");
    }
    assert_eq!(h.mailbox.labels_on("m2"), vec!["AI-FollowUp"]);
    assert_eq!(h.mailbox.labels_on("m3"), vec!["AI-Info"]);
}

#[tokio::test]
async fn empty_body_is_classified_from_headers() {
    let h = harness();
    h.mailbox.deliver("m1", "Header only", "a@example.com", "");

    let summary = h.scheduler.run_cycle(&CancellationToken::new()).await;

    assert_eq!(summary.processed, 1);
    assert_eq!(h.mailbox.labels_on("m1"), vec!["AI-Info"]);
}

// ── Failure handling ────────────────────────────────────────────────

#[tokio::test]
async fn unknown_category_skips_and_leaves_unread() {
    let h = harness();
    h.mailbox.deliver("m1", "Weird one", "x@example.com", "???");

    let summary = h.scheduler.run_cycle(&CancellationToken::new()).await;

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.processed, 0);
    assert!(h.mailbox.calls().is_empty());
    assert!(h.mailbox.is_unread("m1"));
    assert!(h.audit.load().await.unwrap().is_empty());

    // Still there for the next cycle.
    let again = h.scheduler.run_cycle(&CancellationToken::new()).await;
    assert_eq!(again.listed, 1);
    assert_eq!(again.skipped, 1);
}

#[tokio::test]
async fn classifier_outage_skips_without_side_effects() {
    let h = harness_with(Arc::new(DownLlm), always_good());
    h.mailbox.deliver("m1", "Server down", "a@example.com", "help");

    let summary = h.scheduler.run_cycle(&CancellationToken::new()).await;

    assert_eq!(summary.skipped, 1);
    assert!(h.mailbox.calls().is_empty());
    assert!(h.mailbox.is_unread("m1"));
}

#[tokio::test]
async fn verifier_failure_records_unknown_and_still_dispatches() {
    let h = harness_with(standard_classifier(), Arc::new(DownLlm));
    h.mailbox.deliver("m1", "50% off", "deals@shop.example", "");

    h.scheduler.run_cycle(&CancellationToken::new()).await;

    assert!(h.mailbox.calls().contains(&Call::Archive("m1".into())));
    let records = h.audit.load().await.unwrap();
    assert_eq!(records[0].critique, Verdict::Unknown);
    assert_eq!(records[0].classification, Category::Marketing);
}

#[tokio::test]
async fn incorrect_verdict_does_not_change_dispatch() {
    let h = harness_with(
        standard_classifier(),
        ScriptedLlm::new(vec![("Decision:", "incorrect")]),
    );
    h.mailbox.deliver("m1", "Server down", "a@example.com", "help");

    h.scheduler.run_cycle(&CancellationToken::new()).await;

    assert_eq!(h.mailbox.replies().len(), 1);
    let records = h.audit.load().await.unwrap();
    assert_eq!(records[0].critique, Verdict::Incorrect);
}

#[tokio::test]
async fn reply_failure_still_marks_read_and_is_audited() {
    let h = harness();
    h.mailbox.fail("send_reply");
    h.mailbox.deliver("m1", "Server down", "a@example.com", "help");

    let summary = h.scheduler.run_cycle(&CancellationToken::new()).await;

    assert_eq!(summary.processed, 1);
    assert_eq!(h.mailbox.labels_on("m1"), vec!["AI-Urgent"]);
    assert!(!h.mailbox.is_unread("m1"));

    let records = h.audit.load().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action_errors.len(), 1);
    assert!(records[0].action_errors[0].starts_with("send_reply"));
}

#[tokio::test]
async fn label_failure_does_not_block_archive_or_read() {
    let h = harness();
    h.mailbox.fail("ensure_label");
    h.mailbox.deliver("m1", "50% off", "deals@shop.example", "");

    h.scheduler.run_cycle(&CancellationToken::new()).await;

    assert!(h.mailbox.labels_on("m1").is_empty());
    assert!(!h.mailbox.in_inbox("m1"));
    assert!(!h.mailbox.is_unread("m1"));
    let records = h.audit.load().await.unwrap();
    assert!(records[0].action_errors[0].contains("AI-Marketing"));
}

#[tokio::test]
async fn failed_mark_read_leaves_message_for_retry() {
    let h = harness();
    h.mailbox.fail("mark_read");
    h.mailbox.deliver("m1", "Server down", "a@example.com", "help");

    h.scheduler.run_cycle(&CancellationToken::new()).await;
    assert!(h.mailbox.is_unread("m1"));

    h.mailbox.recover("mark_read");
    let summary = h.scheduler.run_cycle(&CancellationToken::new()).await;

    assert_eq!(summary.processed, 1);
    assert!(!h.mailbox.is_unread("m1"));
    // Reprocessing repeats side effects; a duplicate reply is the accepted cost.
    assert_eq!(h.mailbox.replies().len(), 2);
    assert_eq!(h.audit.load().await.unwrap().len(), 2);
}

#[tokio::test]
async fn vanished_message_is_skipped_and_cycle_continues() {
    let h = harness();
    h.mailbox.deliver_vanished("gone");
    h.mailbox.deliver("m1", "Your receipt", "shop@example.com", "");

    let summary = h.scheduler.run_cycle(&CancellationToken::new()).await;

    assert_eq!(summary.listed, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.processed, 1);
    assert_eq!(h.mailbox.labels_on("m1"), vec!["AI-Info"]);
}

#[tokio::test]
async fn transient_fetch_failure_leaves_messages_unread() {
    let h = harness();
    h.mailbox.fail("get_message");
    h.mailbox.deliver("m1", "Server down", "a@example.com", "help");

    let summary = h.scheduler.run_cycle(&CancellationToken::new()).await;

    assert_eq!(summary.skipped, 1);
    assert!(h.mailbox.is_unread("m1"));
}

#[tokio::test]
async fn listing_failure_yields_empty_cycle() {
    let h = harness();
    h.mailbox.fail("list_unread");
    h.mailbox.deliver("m1", "Server down", "a@example.com", "help");

    let summary = h.scheduler.run_cycle(&CancellationToken::new()).await;

    assert_eq!(summary, Default::default());
    assert!(h.mailbox.is_unread("m1"));
}

// ── Idempotence and audit ───────────────────────────────────────────

#[tokio::test]
async fn labels_are_created_once_per_name() {
    let h = harness();
    h.mailbox.deliver("m1", "Server down", "a@example.com", "");
    h.mailbox.deliver("m2", "Server down again", "b@example.com", "");
    h.mailbox.deliver("m3", "Your receipt", "c@example.com", "");

    h.scheduler.run_cycle(&CancellationToken::new()).await;

    assert_eq!(h.mailbox.label_creations.load(Ordering::SeqCst), 2);
    assert_eq!(h.mailbox.labels_on("m2"), vec!["AI-Urgent"]);
}

#[tokio::test]
async fn audit_trail_accumulates_across_cycles_in_order() {
    let h = harness();
    let batches = [
        vec![("a1", "Server down"), ("a2", "Your receipt")],
        vec![("b1", "50% off")],
        vec![("c1", "Lunch next week"), ("c2", "Automated digest")],
    ];

    for batch in &batches {
        for (id, subject) in batch {
            h.mailbox.deliver(id, subject, "x@example.com", "");
        }
        h.scheduler.run_cycle(&CancellationToken::new()).await;
    }

    let records = h.audit.load().await.unwrap();
    let subjects: Vec<&str> = records.iter().map(|r| r.subject.as_str()).collect();
    assert_eq!(
        subjects,
        vec![
            "Server down",
            "Your receipt",
            "50% off",
            "Lunch next week",
            "Automated digest"
        ]
    );
    let categories: Vec<Category> = records.iter().map(|r| r.classification).collect();
    assert_eq!(
        categories,
        vec![
            Category::Urgent,
            Category::Informational,
            Category::Marketing,
            Category::FollowUp,
            Category::Ignore
        ]
    );
}

#[tokio::test]
async fn batch_size_limits_messages_per_cycle() {
    let h = harness();
    for i in 0..7 {
        h.mailbox
            .deliver(&format!("m{i}"), "Your receipt", "shop@example.com", "");
    }

    let first = h.scheduler.run_cycle(&CancellationToken::new()).await;
    assert_eq!(first.processed, 5);
    let second = h.scheduler.run_cycle(&CancellationToken::new()).await;
    assert_eq!(second.processed, 2);
}

// ── Cancellation ────────────────────────────────────────────────────

#[tokio::test]
async fn cancellation_is_observed_between_messages() {
    let h = harness();
    let cancel = CancellationToken::new();
    *h.mailbox.cancel_on_fetch.lock().unwrap() = Some(cancel.clone());
    h.mailbox.deliver("m1", "Your receipt", "a@example.com", "");
    h.mailbox.deliver("m2", "Your receipt", "b@example.com", "");
    h.mailbox.deliver("m3", "Your receipt", "c@example.com", "");

    let summary = h.scheduler.run_cycle(&cancel).await;

    assert!(summary.interrupted);
    assert_eq!(summary.processed, 1);
    assert_eq!(h.mailbox.fetches.load(Ordering::SeqCst), 1);
    assert!(h.mailbox.is_unread("m2"));
    assert!(h.mailbox.is_unread("m3"));
}

#[tokio::test]
async fn run_stops_promptly_when_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let mailbox = Arc::new(MockMailbox::default());
    let audit = Arc::new(JsonFileAuditLog::new(dir.path().join("memory.json")));
    let pipeline = TriagePipeline::new(mailbox.clone(), standard_classifier(), always_good(), audit);
    // Long interval: the loop must not wait it out.
    let scheduler = Scheduler::new(Arc::new(pipeline), Duration::from_secs(3600), 5);

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = tokio::spawn(async move { scheduler.run(token).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let cycles = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("loop did not stop")
        .unwrap();
    assert_eq!(cycles, 1);
}

#[tokio::test]
async fn run_with_cancelled_token_does_nothing() {
    let h = harness();
    h.mailbox.deliver("m1", "Server down", "a@example.com", "help");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let cycles = h.scheduler.run(cancel).await;

    assert_eq!(cycles, 0);
    assert!(h.mailbox.is_unread("m1"));
}

#[tokio::test]
async fn dispatch_report_lists_completed_actions() {
    let dir = tempfile::tempdir().unwrap();
    let mailbox = Arc::new(MockMailbox::default());
    let audit = Arc::new(JsonFileAuditLog::new(dir.path().join("memory.json")));
    let pipeline = TriagePipeline::new(mailbox.clone(), standard_classifier(), always_good(), audit);
    mailbox.deliver("m1", "Server down", "a@example.com", "help");

    let processed = pipeline.process("m1").await.unwrap();

    assert_eq!(
        processed.dispatch.completed,
        vec![
            Action::ApplyLabel("AI-Urgent"),
            Action::SendReply,
            Action::MarkRead
        ]
    );
    assert!(processed.audited);
    assert_eq!(processed.decision.reply, "Investigating now.");
}
