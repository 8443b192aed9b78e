//! Fetched message type, RFC 822 decoding and reply composition.

use lettre::message::header::ContentType;
use mail_parser::{MessageParser, MimeHeaders};

use crate::error::MailboxError;

/// Subject used when replying to a message that had none.
const FALLBACK_REPLY_SUBJECT: &str = "Automated Response";

/// Upper bound on `Message::email_text`, in chars.
pub const MAX_EMAIL_TEXT_CHARS: usize = 8000;

/// A fetched message. Immutable once fetched; dropped at the end of the cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Mailbox-assigned opaque id.
    pub id: String,
    pub subject: String,
    /// Sender address (bare `user@host`). Empty when the header is missing.
    pub sender: String,
    /// Plain-text body. May be empty.
    pub body: String,
    /// `Message-ID` header, used to thread replies.
    pub message_id: Option<String>,
}

impl Message {
    /// Decode a raw RFC 822 message.
    pub fn from_rfc822(id: &str, raw: &[u8]) -> Result<Self, MailboxError> {
        let parsed =
            MessageParser::default()
                .parse(raw)
                .ok_or_else(|| MailboxError::InvalidMessage {
                    id: id.to_string(),
                    reason: "unparseable RFC 822 payload".into(),
                })?;

        Ok(Self {
            id: id.to_string(),
            subject: parsed.subject().unwrap_or_default().to_string(),
            sender: extract_sender(&parsed),
            body: extract_text(&parsed),
            message_id: parsed.message_id().map(|s| s.to_string()),
        })
    }

    /// Text handed to the classifier and verifier, truncated to
    /// `MAX_EMAIL_TEXT_CHARS`. Headers alone when the body is empty.
    pub fn email_text(&self) -> String {
        let mut text = format!(
            "Subject: {}\nFrom: {}\n\n{}",
            self.subject, self.sender, self.body
        );
        if let Some((end, _)) = text.char_indices().nth(MAX_EMAIL_TEXT_CHARS) {
            text.truncate(end);
        }
        text
    }
}

/// An outgoing reply to a fetched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub in_reply_to: Option<String>,
}

impl Reply {
    /// Address a reply back to the original sender.
    pub fn to_message(original: &Message, body: &str) -> Self {
        let subject = original.subject.trim();
        let subject = if subject.is_empty() {
            format!("Re: {FALLBACK_REPLY_SUBJECT}")
        } else if subject.to_ascii_lowercase().starts_with("re:") {
            subject.to_string()
        } else {
            format!("Re: {subject}")
        };

        Self {
            to: original.sender.clone(),
            subject,
            body: body.to_string(),
            in_reply_to: original.message_id.clone(),
        }
    }

    /// Render as RFC 822 bytes.
    pub fn to_rfc822(&self, from: &str) -> Result<Vec<u8>, MailboxError> {
        let invalid = |reason: String| MailboxError::Request {
            operation: "compose_reply".into(),
            reason,
        };

        let mut builder = lettre::Message::builder()
            .from(from.parse().map_err(|e| invalid(format!("Invalid from address: {e}")))?)
            .to(self
                .to
                .parse()
                .map_err(|e| invalid(format!("Invalid to address: {e}")))?)
            .subject(self.subject.clone())
            .header(ContentType::TEXT_PLAIN);

        if let Some(ref id) = self.in_reply_to {
            let id = if id.starts_with('<') {
                id.clone()
            } else {
                format!("<{id}>")
            };
            builder = builder.in_reply_to(id.clone()).references(id);
        }

        let email = builder
            .body(self.body.clone())
            .map_err(|e| invalid(format!("Failed to build email: {e}")))?;

        Ok(email.formatted())
    }
}


fn extract_sender(parsed: &mail_parser::Message) -> String {
    let Some(from) = parsed.from() else {
        return String::new();
    };
    from.first()
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_default()
}

/// First body part as text (mail-parser renders HTML-only bodies to text),
/// then the first textual attachment. Empty when nothing decodes.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.trim().to_string();
    }
    for part in parsed.attachments() {
        if let Some(ct) = MimeHeaders::content_type(part)
            && ct.ctype() == "text"
            && let Ok(text) = std::str::from_utf8(part.contents())
        {
            return text.trim().to_string();
        }
    }
    String::new()
}
