//! Command-line entry point and the single classification run

use clap::Parser;
use std::sync::Arc;
use tracing::info;

use crate::auth::{self, AuthFlow, CredentialStore};
use crate::classifier::MailClassifier;
use crate::client::{GmailService, MailService};
use crate::config::Config;
use crate::error::Result;
use crate::models::ClassificationReport;

/// Takes no options; files are read from the working directory
/// (`credentials.json`, `token.json`, optional `config.toml`).
#[derive(Parser, Debug)]
#[command(name = "college-mail-sorter")]
#[command(version)]
#[command(
    about = "Label unlabelled college admissions mail in Gmail by sender",
    long_about = None
)]
pub struct Cli {}

/// Authenticate, then run one classification pass over the mailbox
pub async fn run(
    config: &Config,
    store: &dyn CredentialStore,
    flow: &dyn AuthFlow,
) -> Result<ClassificationReport> {
    let credential = auth::authenticate(store, flow).await?;
    println!("Authenticated!");

    let hub = auth::build_hub(&credential)?;
    let service: Arc<dyn MailService> = Arc::new(GmailService::new(hub));

    info!("Searching with query: {}", config.search.query);
    MailClassifier::new(service, config).get_college_emails().await
}

/// Summary printed after a pass
pub fn format_report(report: &ClassificationReport) -> String {
    [
        "========================================".to_string(),
        format!("Messages matched: {}", report.messages_matched),
        format!("Messages labelled: {}", report.messages_labeled),
        format!("Messages skipped: {}", report.messages_skipped),
        format!("Labels created: {}", report.labels_created),
        "========================================".to_string(),
    ]
    .join("\n")
}
