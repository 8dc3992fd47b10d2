//! Label lookup and creation
use crate::client::MailService;
use crate::error::{Result, SorterError};
use crate::models::LabelInfo;
use std::sync::Arc;
use tracing::{debug, info};

/// How a label id was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelResolution {
    Existing(String),
    Created(String),
}

impl LabelResolution {
    pub fn id(&self) -> &str {
        match self {
            LabelResolution::Existing(id) | LabelResolution::Created(id) => id,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, LabelResolution::Created(_))
    }
}

/// Sole writer of label-creation calls
pub struct LabelManager {
    service: Arc<dyn MailService>,
}

impl LabelManager {
    pub fn new(service: Arc<dyn MailService>) -> Self {
        Self { service }
    }

    /// Fetches the current label list from the service; nothing is cached
    pub async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        self.service.list_labels().await
    }

    /// Creates a label with the exact name provided and returns its id
    ///
    /// Does not check for an existing label first: the service rejects
    /// duplicate names and that rejection is returned as-is.
    pub async fn create_label(&self, name: &str) -> Result<String> {
        if name.trim().is_empty() {
            return Err(SorterError::LabelError(
                "Label name cannot be empty".to_string(),
            ));
        }

        let label_id = self.service.create_label(name).await?;

        println!("Created label with name {}", name);
        info!("Created label '{}' with ID: {}", name, label_id);
        Ok(label_id)
    }

    /// Id of the label whose name matches exactly (case-sensitive)
    pub fn find_label_id<'a>(labels: &'a [LabelInfo], name: &str) -> Option<&'a str> {
        labels
            .iter()
            .find(|label| label.name == name)
            .map(|label| label.id.as_str())
    }

    /// Reuses the label from `labels` when present, otherwise creates it
    pub async fn ensure_label(&self, labels: &[LabelInfo], name: &str) -> Result<LabelResolution> {
        if let Some(id) = Self::find_label_id(labels, name) {
            debug!("Label '{}' already exists with ID: {}", name, id);
            return Ok(LabelResolution::Existing(id.to_string()));
        }

        self.create_label(name).await.map(LabelResolution::Created)
    }
}
