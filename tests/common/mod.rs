//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use college_mail_sorter::client::MailService;
use college_mail_sorter::error::{Result, SorterError};
use college_mail_sorter::models::{LabelInfo, MessageDetail, MessageHeader, MessageRef};
use mockall::mock;
use std::collections::HashMap;
use std::sync::Mutex;

pub const STANFORD_FROM: &str = "Stanford Admissions <admission@stanford.edu>";
pub const MIT_FROM: &str = "MIT Admissions <admissions@mit.edu>";

pub fn create_label_info(id: &str, name: &str) -> LabelInfo {
    LabelInfo {
        id: id.to_string(),
        name: name.to_string(),
    }
}

pub fn create_message_ref(id: &str) -> MessageRef {
    MessageRef { id: id.to_string() }
}

/// Message whose only header is `From`
pub fn create_message_detail(id: &str, from: &str) -> MessageDetail {
    MessageDetail {
        id: id.to_string(),
        headers: vec![
            MessageHeader {
                name: "Subject".to_string(),
                value: "Your application".to_string(),
            },
            MessageHeader {
                name: "From".to_string(),
                value: from.to_string(),
            },
        ],
    }
}

pub fn system_labels() -> Vec<LabelInfo> {
    vec![
        create_label_info("INBOX", "INBOX"),
        create_label_info("UNREAD", "UNREAD"),
    ]
}

mock! {
    pub MailService {}

    #[async_trait]
    impl MailService for MailService {
        async fn search(&self, query: &str) -> Result<Vec<MessageRef>>;
        async fn get_message(&self, id: &str) -> Result<MessageDetail>;
        async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
        async fn create_label(&self, name: &str) -> Result<String>;
        async fn modify_message(&self, id: &str, add_label_ids: &[String]) -> Result<()>;
    }
}

/// Number of calls a `FakeMailbox` has served, per operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub search: usize,
    pub get_message: usize,
    pub list_labels: usize,
    pub create_label: usize,
    pub modify_message: usize,
}

#[derive(Default)]
struct MailboxState {
    labels: Vec<LabelInfo>,
    /// message id -> (From header, applied user label ids)
    messages: Vec<(String, String, Vec<String>)>,
    next_label: usize,
    calls: CallCounts,
}

/// In-memory mailbox behaving like Gmail for `has:nouserlabels` searches
///
/// Search ignores the query text and returns every message without a user
/// label; creating an existing label name fails with a conflict.
#[derive(Default)]
pub struct FakeMailbox {
    state: Mutex<MailboxState>,
}

impl FakeMailbox {
    pub fn new(messages: &[(&str, &str)]) -> Self {
        let mailbox = Self::default();
        {
            let mut state = mailbox.state.lock().unwrap();
            state.labels = system_labels();
            state.messages = messages
                .iter()
                .map(|(id, from)| (id.to_string(), from.to_string(), Vec::new()))
                .collect();
        }
        mailbox
    }

    pub fn with_label(self, id: &str, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .labels
            .push(create_label_info(id, name));
        self
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn reset_calls(&self) {
        self.state.lock().unwrap().calls = CallCounts::default();
    }

    pub fn label_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.labels.iter().map(|l| l.name.clone()).collect()
    }

    /// Names of the labels applied to a message
    pub fn labels_of(&self, message_id: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let by_id: HashMap<&str, &str> = state
            .labels
            .iter()
            .map(|l| (l.id.as_str(), l.name.as_str()))
            .collect();

        state
            .messages
            .iter()
            .find(|(id, _, _)| id == message_id)
            .map(|(_, _, applied)| {
                applied
                    .iter()
                    .filter_map(|id| by_id.get(id.as_str()).map(|n| n.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl MailService for FakeMailbox {
    async fn search(&self, _query: &str) -> Result<Vec<MessageRef>> {
        let mut state = self.state.lock().unwrap();
        state.calls.search += 1;
        Ok(state
            .messages
            .iter()
            .filter(|(_, _, applied)| applied.is_empty())
            .map(|(id, _, _)| create_message_ref(id))
            .collect())
    }

    async fn get_message(&self, id: &str) -> Result<MessageDetail> {
        let mut state = self.state.lock().unwrap();
        state.calls.get_message += 1;
        state
            .messages
            .iter()
            .find(|(message_id, _, _)| message_id == id)
            .map(|(message_id, from, _)| create_message_detail(message_id, from))
            .ok_or_else(|| SorterError::NotFound(id.to_string()))
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        let mut state = self.state.lock().unwrap();
        state.calls.list_labels += 1;
        Ok(state.labels.clone())
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.create_label += 1;
        if state.labels.iter().any(|l| l.name == name) {
            return Err(SorterError::LabelConflict(format!(
                "Label name exists or conflicts: {}",
                name
            )));
        }

        state.next_label += 1;
        let id = format!("Label_{}", state.next_label);
        state.labels.push(create_label_info(&id, name));
        Ok(id)
    }

    async fn modify_message(&self, id: &str, add_label_ids: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.modify_message += 1;
        let (_, _, applied) = state
            .messages
            .iter_mut()
            .find(|(message_id, _, _)| message_id == id)
            .ok_or_else(|| SorterError::NotFound(id.to_string()))?;

        for label_id in add_label_ids {
            if !applied.contains(label_id) {
                applied.push(label_id.clone());
            }
        }
        Ok(())
    }
}
