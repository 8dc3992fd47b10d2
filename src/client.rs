//! Gmail API client behind the `MailService` trait

use async_trait::async_trait;
use google_gmail1::{
    api::{Label, Message, ModifyMessageRequest},
    hyper_rustls, hyper_util, Gmail,
};
use tracing::debug;

use crate::error::{Result, SorterError};
use crate::models::{LabelInfo, MessageDetail, MessageHeader, MessageRef};

/// Scope requested for every call; covers reading, labelling and label creation
pub const GMAIL_MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Remote mail operations the classifier depends on
#[async_trait]
pub trait MailService: Send + Sync {
    /// Messages matching a Gmail search query (first result page only)
    async fn search(&self, query: &str) -> Result<Vec<MessageRef>>;

    /// Fetch a message with its headers
    async fn get_message(&self, id: &str) -> Result<MessageDetail>;

    /// List all labels in the account
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Create a new label, returning its id
    async fn create_label(&self, name: &str) -> Result<String>;

    /// Add labels to a message; existing labels are left alone
    async fn modify_message(&self, id: &str, add_label_ids: &[String]) -> Result<()>;
}

/// `MailService` backed by the Gmail REST API
pub struct GmailService {
    hub: GmailHub,
}

impl GmailService {
    pub fn new(hub: GmailHub) -> Self {
        Self { hub }
    }
}

/// Convert a Gmail API message into a `MessageDetail`
fn parse_message_detail(msg: Message) -> Result<MessageDetail> {
    let id = msg
        .id
        .ok_or_else(|| SorterError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let headers = msg
        .payload
        .and_then(|p| p.headers)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|header| match (header.name, header.value) {
            (Some(name), Some(value)) => Some(MessageHeader { name, value }),
            _ => None,
        })
        .collect();

    Ok(MessageDetail { id, headers })
}

/// Keep only labels that carry both an id and a name
fn collect_labels(labels: Option<Vec<Label>>) -> Vec<LabelInfo> {
    labels
        .unwrap_or_default()
        .into_iter()
        .filter_map(|label| match (label.id, label.name) {
            (Some(id), Some(name)) => Some(LabelInfo { id, name }),
            _ => None,
        })
        .collect()
}

/// Search results; a response without `messages` means zero matches
fn collect_message_refs(messages: Option<Vec<Message>>) -> Vec<MessageRef> {
    messages
        .unwrap_or_default()
        .into_iter()
        .filter_map(|msg| msg.id.map(|id| MessageRef { id }))
        .collect()
}

#[async_trait]
impl MailService for GmailService {
    async fn search(&self, query: &str) -> Result<Vec<MessageRef>> {
        debug!("Searching messages: {}", query);
        let (_, response) = self
            .hub
            .users()
            .messages_list("me")
            .q(query)
            .add_scope(GMAIL_MODIFY_SCOPE)
            .doit()
            .await?;

        let refs = collect_message_refs(response.messages);
        debug!("Search matched {} messages", refs.len());
        Ok(refs)
    }

    async fn get_message(&self, id: &str) -> Result<MessageDetail> {
        let (_, msg) = self
            .hub
            .users()
            .messages_get("me", id)
            .format("metadata")
            .add_metadata_headers("From")
            .add_scope(GMAIL_MODIFY_SCOPE)
            .doit()
            .await?;

        parse_message_detail(msg)
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        debug!("Calling Gmail API to list labels...");
        let (_, response) = self
            .hub
            .users()
            .labels_list("me")
            .add_scope(GMAIL_MODIFY_SCOPE)
            .doit()
            .await?;

        let labels = collect_labels(response.labels);
        debug!("Successfully parsed {} labels", labels.len());
        Ok(labels)
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        let label = Label {
            name: Some(name.to_string()),
            message_list_visibility: Some("show".to_string()),
            label_list_visibility: Some("labelShow".to_string()),
            ..Default::default()
        };

        let (_, created_label) = self
            .hub
            .users()
            .labels_create(label, "me")
            .add_scope(GMAIL_MODIFY_SCOPE)
            .doit()
            .await?;

        created_label
            .id
            .ok_or_else(|| SorterError::LabelError("Created label has no ID".to_string()))
    }

    async fn modify_message(&self, id: &str, add_label_ids: &[String]) -> Result<()> {
        let modify_request = ModifyMessageRequest {
            add_label_ids: Some(add_label_ids.to_vec()),
            remove_label_ids: None,
        };

        self.hub
            .users()
            .messages_modify(modify_request, "me", id)
            .add_scope(GMAIL_MODIFY_SCOPE)
            .doit()
            .await?;

        Ok(())
    }
}
