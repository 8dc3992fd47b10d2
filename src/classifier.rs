//! Sender-based labelling of college admissions mail
//!
//! One pass searches for unlabelled admissions messages and files each one
//! under `<parent>/<sender display name>`, creating the nested label the
//! first time a sender is seen.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::MailService;
use crate::config::Config;
use crate::error::{Result, SorterError};
use crate::label_manager::LabelManager;
use crate::models::{ClassificationReport, MessageRef};

/// Display name of a `From` header value
///
/// - `Name <addr>` gives `Name` (surrounding quotes removed)
/// - a bare address is returned whole
/// - `<addr>` with nothing in front gives `addr`
///
/// Returns `None` when nothing usable is left.
pub fn sender_display_name(from: &str) -> Option<String> {
    let from = from.trim();

    let name = match from.find('<') {
        Some(start) => {
            let display = from[..start].trim().trim_matches('"').trim();
            if display.is_empty() {
                let rest = &from[start + 1..];
                let end = rest.find('>').unwrap_or(rest.len());
                rest[..end].trim()
            } else {
                display
            }
        }
        None => from,
    };

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Nested label name, e.g. `College/Stanford Admissions`
pub fn nested_label_name(parent: &str, display_name: &str) -> String {
    format!("{}/{}", parent, display_name)
}

/// Files matching messages under per-sender labels
pub struct MailClassifier {
    service: Arc<dyn MailService>,
    labels: LabelManager,
    query: String,
    parent_label: String,
}

impl MailClassifier {
    pub fn new(service: Arc<dyn MailService>, config: &Config) -> Self {
        Self {
            labels: LabelManager::new(Arc::clone(&service)),
            service,
            query: config.search.query.clone(),
            parent_label: config.labels.parent.clone(),
        }
    }

    /// Runs one pass over every message matching the query right now
    ///
    /// The label list is fetched again for every message so a label created
    /// for an earlier message in the same pass is reused, not recreated.
    /// Messages without a usable `From` header are skipped; service errors
    /// end the pass.
    pub async fn get_college_emails(&self) -> Result<ClassificationReport> {
        let matches = self.service.search(&self.query).await?;
        let mut report = ClassificationReport {
            messages_matched: matches.len(),
            ..Default::default()
        };

        if matches.is_empty() {
            info!("No messages matched the search query");
            return Ok(report);
        }

        info!("Found {} matching messages", matches.len());

        for message in &matches {
            match self.classify_message(message).await {
                Ok(created) => {
                    report.messages_labeled += 1;
                    if created {
                        report.labels_created += 1;
                    }
                }
                Err(SorterError::InvalidMessageFormat(reason)) => {
                    warn!("Skipping message {}: {}", message.id, reason);
                    report.messages_skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "Labelled {} messages, created {} labels, skipped {}",
            report.messages_labeled, report.labels_created, report.messages_skipped
        );
        Ok(report)
    }

    /// Labels one message; returns whether a new label had to be created
    async fn classify_message(&self, message: &MessageRef) -> Result<bool> {
        let existing = self.labels.list_labels().await?;

        let detail = self.service.get_message(&message.id).await?;
        let from = detail.from_header().ok_or_else(|| {
            SorterError::InvalidMessageFormat("Missing From header".to_string())
        })?;
        let name = sender_display_name(from).ok_or_else(|| {
            SorterError::InvalidMessageFormat(format!("No sender name in '{}'", from))
        })?;

        println!("Reading email from {}", name);
        let label_name = nested_label_name(&self.parent_label, &name);

        let resolution = self.labels.ensure_label(&existing, &label_name).await?;

        debug!("Applying label {} to message {}", label_name, message.id);
        self.service
            .modify_message(&message.id, &[resolution.id().to_string()])
            .await?;

        Ok(resolution.was_created())
    }
}
