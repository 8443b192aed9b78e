//! Gmail backend: REST v1 over reqwest.
//!
//! Messages are fetched in `raw` format and decoded with mail-parser;
//! replies are composed with lettre and uploaded as base64url `raw`.
//! The bearer token is supplied by the process entry point; acquiring and
//! refreshing it is outside this module.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ConfigError, MailboxError};
use crate::mailbox::{LabelId, Mailbox, Message, Reply};

const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com";

/// System label marking unread messages.
const UNREAD: &str = "UNREAD";

/// System label marking inbox presence.
const INBOX: &str = "INBOX";

// ── Configuration ───────────────────────────────────────────────────

/// Gmail backend configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub api_base: String,
    pub user_id: String,
    pub access_token: SecretString,
    /// Address used as `From` on replies. Looked up from the profile when unset.
    pub from_address: Option<String>,
}

impl GmailConfig {
    /// Build config from `GMAIL_ACCESS_TOKEN`, `GMAIL_USER_ID`,
    /// `GMAIL_API_BASE` and `GMAIL_FROM_ADDRESS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let access_token = std::env::var("GMAIL_ACCESS_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("GMAIL_ACCESS_TOKEN".into()))?;

        Ok(Self {
            api_base: std::env::var("GMAIL_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            user_id: std::env::var("GMAIL_USER_ID").unwrap_or_else(|_| "me".to_string()),
            access_token: SecretString::from(access_token),
            from_address: std::env::var("GMAIL_FROM_ADDRESS").ok(),
        })
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct RawMessageResponse {
    id: String,
    raw: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LabelResource {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ListLabelsResponse {
    #[serde(default)]
    labels: Vec<LabelResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    email_address: String,
}

// ── Mailbox ─────────────────────────────────────────────────────────

/// Gmail mailbox over the REST API.
pub struct GmailMailbox {
    config: GmailConfig,
    client: reqwest::Client,
    from_address: String,
    /// Serializes label lookup-then-create so one name maps to one label.
    label_lock: Mutex<()>,
}

impl GmailMailbox {
    /// Build the backend, resolving the reply address from the profile when
    /// it is not configured.
    pub async fn connect(config: GmailConfig) -> Result<Self, MailboxError> {
        let client = reqwest::Client::new();
        let mut mailbox = Self {
            from_address: config.from_address.clone().unwrap_or_default(),
            config,
            client,
            label_lock: Mutex::new(()),
        };

        if mailbox.from_address.is_empty() {
            let profile: ProfileResponse = mailbox
                .get_json("get_profile", mailbox.user_url("profile"), &[])
                .await?;
            mailbox.from_address = profile.email_address;
        }

        info!(user = %mailbox.from_address, "Gmail mailbox connected");
        Ok(mailbox)
    }

    fn user_url(&self, path: &str) -> String {
        format!(
            "{}/gmail/v1/users/{}/{path}",
            self.config.api_base.trim_end_matches('/'),
            self.config.user_id
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        url: String,
        query: &[(&str, String)],
    ) -> Result<T, MailboxError> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(self.config.access_token.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;
        decode(operation, resp).await
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        url: String,
        body: &serde_json::Value,
    ) -> Result<T, MailboxError> {
        let resp = self
            .client
            .post(url)
            .bearer_auth(self.config.access_token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;
        decode(operation, resp).await
    }

    async fn modify(
        &self,
        id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> Result<(), MailboxError> {
        let body = serde_json::json!({
            "addLabelIds": add,
            "removeLabelIds": remove,
        });
        let url = self.user_url(&format!("messages/{id}/modify"));
        let resp = self
            .client
            .post(url)
            .bearer_auth(self.config.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("modify_message", e))?;

        if resp.status().is_success() {
            return Ok(());
        }
        Err(status_error(
            "modify_message",
            Some(id),
            resp.status(),
            resp.text().await.unwrap_or_default(),
        ))
    }

    async fn find_label(&self, name: &str) -> Result<Option<LabelId>, MailboxError> {
        let listing: ListLabelsResponse =
            self.get_json("list_labels", self.user_url("labels"), &[]).await?;
        Ok(listing
            .labels
            .into_iter()
            .find(|l| l.name == name)
            .map(|l| LabelId(l.id)))
    }
}

#[async_trait]
impl Mailbox for GmailMailbox {
    fn name(&self) -> &str {
        "gmail"
    }

    /// Filters on the `UNREAD` label alone, so unread archived mail is listed too.
    async fn list_unread(&self, limit: usize) -> Result<Vec<String>, MailboxError> {
        let listing: ListMessagesResponse = self
            .get_json(
                "list_unread",
                self.user_url("messages"),
                &[
                    ("labelIds", UNREAD.to_string()),
                    ("maxResults", limit.to_string()),
                ],
            )
            .await?;
        Ok(listing.messages.into_iter().map(|m| m.id).take(limit).collect())
    }

    async fn get_message(&self, id: &str) -> Result<Message, MailboxError> {
        let url = self.user_url(&format!("messages/{id}"));
        let resp = self
            .client
            .get(url)
            .bearer_auth(self.config.access_token.expose_secret())
            .query(&[("format", "raw")])
            .send()
            .await
            .map_err(|e| transport_error("get_message", e))?;

        if !resp.status().is_success() {
            return Err(status_error(
                "get_message",
                Some(id),
                resp.status(),
                resp.text().await.unwrap_or_default(),
            ));
        }

        let payload: RawMessageResponse =
            resp.json().await.map_err(|e| MailboxError::InvalidMessage {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        let raw = payload.raw.ok_or_else(|| MailboxError::InvalidMessage {
            id: id.to_string(),
            reason: "response carried no raw payload".into(),
        })?;
        let bytes = decode_base64url(&raw).map_err(|reason| MailboxError::InvalidMessage {
            id: id.to_string(),
            reason,
        })?;

        Message::from_rfc822(&payload.id, &bytes)
    }

    async fn ensure_label(&self, name: &str) -> Result<LabelId, MailboxError> {
        let _guard = self.label_lock.lock().await;

        if let Some(id) = self.find_label(name).await? {
            return Ok(id);
        }

        let body = serde_json::json!({
            "name": name,
            "labelListVisibility": "labelShow",
            "messageListVisibility": "show",
        });
        match self
            .post_json::<LabelResource>("create_label", self.user_url("labels"), &body)
            .await
        {
            Ok(created) => {
                info!(label = %name, id = %created.id, "Created label");
                Ok(LabelId(created.id))
            }
            // Another client created it between our lookup and create.
            Err(MailboxError::Request { ref reason, .. }) if reason.starts_with("409") => self
                .find_label(name)
                .await?
                .ok_or_else(|| MailboxError::Request {
                    operation: "create_label".into(),
                    reason: format!("label '{name}' reported as existing but not listed"),
                }),
            Err(e) => Err(e),
        }
    }

    async fn add_label(&self, id: &str, label: &LabelId) -> Result<(), MailboxError> {
        debug!(id, label = %label, "Adding label");
        self.modify(id, &[label.as_str()], &[]).await
    }

    async fn remove_label(&self, id: &str, label: &LabelId) -> Result<(), MailboxError> {
        debug!(id, label = %label, "Removing label");
        self.modify(id, &[], &[label.as_str()]).await
    }

    async fn archive(&self, id: &str) -> Result<(), MailboxError> {
        self.remove_label(id, &LabelId(INBOX.to_string())).await
    }

    async fn mark_read(&self, id: &str) -> Result<(), MailboxError> {
        self.remove_label(id, &LabelId(UNREAD.to_string())).await
    }

    async fn send_reply(&self, reply: &Reply) -> Result<(), MailboxError> {
        let raw = reply.to_rfc822(&self.from_address)?;
        let body = serde_json::json!({ "raw": URL_SAFE_NO_PAD.encode(raw) });

        let resp = self
            .client
            .post(self.user_url("messages/send"))
            .bearer_auth(self.config.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("send_reply", e))?;

        if !resp.status().is_success() {
            return Err(status_error(
                "send_reply",
                None,
                resp.status(),
                resp.text().await.unwrap_or_default(),
            ));
        }

        info!(to = %reply.to, "Reply sent");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

async fn decode<T: serde::de::DeserializeOwned>(
    operation: &str,
    resp: reqwest::Response,
) -> Result<T, MailboxError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(status_error(operation, None, status, body));
    }
    resp.json().await.map_err(|e| MailboxError::Request {
        operation: operation.to_string(),
        reason: format!("invalid response body: {e}"),
    })
}

fn transport_error(operation: &str, err: reqwest::Error) -> MailboxError {
    MailboxError::Transient {
        operation: operation.to_string(),
        reason: err.to_string(),
    }
}

/// Map an HTTP failure status onto the mailbox error taxonomy.
fn status_error(
    operation: &str,
    id: Option<&str>,
    status: StatusCode,
    body: String,
) -> MailboxError {
    match status {
        StatusCode::NOT_FOUND if id.is_some() => MailboxError::NotFound {
            id: id.unwrap_or_default().to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => MailboxError::Transient {
            operation: operation.to_string(),
            reason: format!("{status}: {body}"),
        },
        s if s.is_server_error() => MailboxError::Transient {
            operation: operation.to_string(),
            reason: format!("{status}: {body}"),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MailboxError::Auth {
            reason: format!("{operation}: {status}"),
        },
        _ => MailboxError::Request {
            operation: operation.to_string(),
            reason: format!("{}: {body}", status.as_u16()),
        },
    }
}

/// Gmail emits base64url, with or without padding.
fn decode_base64url(data: &str) -> Result<Vec<u8>, String> {
    URL_SAFE_NO_PAD
        .decode(data.trim().trim_end_matches('='))
        .map_err(|e| format!("invalid base64url payload: {e}"))
}
